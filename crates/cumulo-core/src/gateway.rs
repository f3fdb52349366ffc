// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local gateway: turns worker-table topology into live network listeners.
//!
//! The gateway owns one TCP listener per API name, one per HTTP-proxy host,
//! and one per servable websocket socket. On every table snapshot it
//! reconciles by full rebuild of the desired name set: listeners for names
//! no longer present are shut down with a bounded grace period, listeners
//! for new names are bound, on the port pinned in the port map or an
//! ephemeral one. A mapped port already in use fails only that resource.
//!
//! Incremental patching would save little at local-project scale (tens of
//! resources) and the full diff is self-correcting after any missed event.

pub mod http;
pub mod ports;
pub mod triggers;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::error::CoreError;
use crate::plane::ControlPlane;
use self::ports::PortMap;

/// How long an evicted listener gets to drain in-flight connections before
/// its task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// One bound listener and the handles to stop it.
struct BoundListener {
    name: String,
    port: u16,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The three parallel listener sets, exclusively owned by the gateway.
#[derive(Default)]
struct ListenerSets {
    apis: Vec<BoundListener>,
    proxies: Vec<BoundListener>,
    sockets: Vec<BoundListener>,
}

/// The externally-facing component: listeners, routing, trigger endpoints.
pub struct Gateway {
    plane: Arc<ControlPlane>,
    ports: PortMap,
    listeners: Mutex<ListenerSets>,
}

impl Gateway {
    /// Create a gateway over the given control plane.
    pub fn new(plane: Arc<ControlPlane>, ports: PortMap) -> Arc<Self> {
        Arc::new(Self {
            plane,
            ports,
            listeners: Mutex::new(ListenerSets::default()),
        })
    }

    /// Reconcile forever: once immediately, then on every snapshot from the
    /// API, proxy, and websocket tables.
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut apis_rx = self.plane.apis.subscribe();
        let mut proxies_rx = self.plane.http.subscribe();
        let mut sockets_rx = self.plane.websockets.subscribe();

        self.reconcile_apis().await;
        self.reconcile_proxies().await;
        self.reconcile_sockets().await;
        info!("gateway reconciler running");

        loop {
            tokio::select! {
                changed = apis_rx.changed() => {
                    if changed.is_err() { break; }
                    self.reconcile_apis().await;
                }
                changed = proxies_rx.changed() => {
                    if changed.is_err() { break; }
                    self.reconcile_proxies().await;
                }
                changed = sockets_rx.changed() => {
                    if changed.is_err() { break; }
                    self.reconcile_sockets().await;
                }
            }
        }
        Ok(())
    }

    /// The port an API is currently served on, if any.
    pub async fn api_port(&self, name: &str) -> Option<u16> {
        let sets = self.listeners.lock().await;
        sets.apis.iter().find(|l| l.name == name).map(|l| l.port)
    }

    /// The port a proxy host is currently served on, if any.
    pub async fn proxy_port(&self, name: &str) -> Option<u16> {
        let sets = self.listeners.lock().await;
        sets.proxies.iter().find(|l| l.name == name).map(|l| l.port)
    }

    /// The port a websocket socket is currently served on, if any.
    pub async fn socket_port(&self, name: &str) -> Option<u16> {
        let sets = self.listeners.lock().await;
        sets.sockets.iter().find(|l| l.name == name).map(|l| l.port)
    }

    /// Reconcile API listeners against the current API table.
    pub async fn reconcile_apis(&self) {
        let desired = self.plane.apis.resource_names();
        let mut sets = self.listeners.lock().await;

        shutdown_removed("api", &mut sets.apis, &desired).await;

        for name in &desired {
            if sets.apis.iter().any(|l| &l.name == name) {
                continue;
            }
            let router = http::api_router(name.clone(), self.plane.clone());
            match bind_listener("api", name, self.ports.api(name), router).await {
                Ok(listener) => sets.apis.push(listener),
                Err(e) => self.plane.errors.record(e),
            }
        }
    }

    /// Reconcile proxy listeners against the current proxy table.
    pub async fn reconcile_proxies(&self) {
        let desired = self.plane.http.resource_names();
        let mut sets = self.listeners.lock().await;

        shutdown_removed("http", &mut sets.proxies, &desired).await;

        for name in &desired {
            if sets.proxies.iter().any(|l| &l.name == name) {
                continue;
            }
            let router = http::proxy_router(name.clone(), self.plane.clone());
            match bind_listener("http", name, self.ports.proxy(name), router).await {
                Ok(listener) => sets.proxies.push(listener),
                Err(e) => self.plane.errors.record(e),
            }
        }
    }

    /// Reconcile websocket listeners against the current websocket table.
    ///
    /// A socket only counts as servable while it has at least one registered
    /// handler.
    pub async fn reconcile_sockets(&self) {
        let desired: Vec<String> = self
            .plane
            .websockets
            .resource_names()
            .into_iter()
            .filter(|name| self.plane.websockets.worker_count(name) > 0)
            .collect();
        let mut sets = self.listeners.lock().await;

        shutdown_removed("websocket", &mut sets.sockets, &desired).await;

        for name in &desired {
            if sets.sockets.iter().any(|l| &l.name == name) {
                continue;
            }
            let router = websocket::socket_router(name.clone(), self.plane.clone());
            match bind_listener("websocket", name, self.ports.websocket(name), router).await {
                Ok(listener) => sets.sockets.push(listener),
                Err(e) => self.plane.errors.record(e),
            }
        }
    }

    /// Stop every listener (used on shutdown).
    pub async fn shutdown(&self) {
        let mut sets = self.listeners.lock().await;
        let sets = &mut *sets;
        for listener in sets
            .apis
            .drain(..)
            .chain(sets.proxies.drain(..))
            .chain(sets.sockets.drain(..))
        {
            stop_listener("gateway", listener).await;
        }
    }
}

/// Shut down every bound listener whose name is no longer desired.
async fn shutdown_removed(kind: &'static str, listeners: &mut Vec<BoundListener>, desired: &[String]) {
    let mut kept = Vec::with_capacity(listeners.len());
    for listener in listeners.drain(..) {
        if desired.contains(&listener.name) {
            kept.push(listener);
        } else {
            stop_listener(kind, listener).await;
        }
    }
    *listeners = kept;
}

/// Stop one listener: signal graceful shutdown, then abort after the grace
/// period so in-flight connections cannot wedge reconciliation.
async fn stop_listener(kind: &'static str, mut listener: BoundListener) {
    let _ = listener.shutdown.send(true);
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut listener.handle)
        .await
        .is_err()
    {
        listener.handle.abort();
    }
    info!(kind, name = %listener.name, port = listener.port, "listener stopped");
}

/// Bind a listener for one resource and serve its router on a fresh task.
async fn bind_listener(
    kind: &'static str,
    name: &str,
    mapped_port: Option<u16>,
    router: Router,
) -> Result<BoundListener, CoreError> {
    let port = mapped_port.unwrap_or(0);
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| match mapped_port {
            Some(port) => CoreError::PortInUse {
                name: name.to_string(),
                port,
            },
            None => CoreError::ListenerBindFailed {
                name: name.to_string(),
                reason: e.to_string(),
            },
        })?;
    let actual_port = listener
        .local_addr()
        .map_err(|e| CoreError::ListenerBindFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?
        .port();

    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task_name = name.to_string();
    let handle = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.changed().await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            error!(name = %task_name, "listener error: {}", e);
        }
    });

    info!(kind, name, port = actual_port, "listener started");
    Ok(BoundListener {
        name: name.to_string(),
        port: actual_port,
        shutdown,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::MockChannel;
    use crate::workers::Worker;
    use cumulo_protocol::messages::{WebsocketEventType, WebsocketSpec};

    #[tokio::test]
    async fn test_reconcile_binds_and_removes_api_listeners() {
        let plane = ControlPlane::new();
        let gateway = Gateway::new(plane.clone(), PortMap::default());

        let worker = Worker::new(
            "svc",
            cumulo_protocol::messages::ApiRouteSpec {
                api: "public".to_string(),
                methods: vec!["GET".to_string()],
                path: "/users".to_string(),
            },
            Arc::new(MockChannel::http(200, "ok")),
        );
        let worker_id = worker.id;
        plane.apis.try_register(worker).unwrap();

        gateway.reconcile_apis().await;
        let port = gateway.api_port("public").await.expect("listener bound");

        // The listener is really accepting.
        tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to bound listener");

        // Last worker gone: the next reconciliation removes the listener and
        // new connections are refused rather than served a stale 404.
        plane.apis.unregister("public", "svc", worker_id);
        gateway.reconcile_apis().await;
        assert!(gateway.api_port("public").await.is_none());
        assert!(
            tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_mapped_port_conflict_fails_only_that_resource() {
        let plane = ControlPlane::new();

        // Occupy a port, then map an API onto it.
        let occupied = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken_port = occupied.local_addr().unwrap().port();

        let mut ports = PortMap::default();
        ports.apis.insert("pinned".to_string(), taken_port);
        let gateway = Gateway::new(plane.clone(), ports);

        for api in ["pinned", "free"] {
            plane
                .apis
                .try_register(Worker::new(
                    "svc",
                    cumulo_protocol::messages::ApiRouteSpec {
                        api: api.to_string(),
                        methods: vec!["GET".to_string()],
                        path: "/".to_string(),
                    },
                    Arc::new(MockChannel::http(200, "ok")),
                ))
                .unwrap();
        }

        gateway.reconcile_apis().await;

        // The pinned API failed with a recorded error; the other came up.
        assert!(gateway.api_port("pinned").await.is_none());
        assert!(gateway.api_port("free").await.is_some());
        let errors = plane.errors.list();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.error_code(), "PORT_IN_USE");
    }

    #[tokio::test]
    async fn test_socket_without_workers_is_not_servable() {
        let plane = ControlPlane::new();
        let gateway = Gateway::new(plane.clone(), PortMap::default());

        gateway.reconcile_sockets().await;
        assert!(gateway.socket_port("chat").await.is_none());

        plane.websockets.register_for_test(Worker::new(
            "svc",
            WebsocketSpec {
                socket: "chat".to_string(),
                event_type: WebsocketEventType::Connect as i32,
            },
            Arc::new(MockChannel::websocket(true, "")),
        ));

        gateway.reconcile_sockets().await;
        assert!(gateway.socket_port("chat").await.is_some());

        gateway.shutdown().await;
    }
}
