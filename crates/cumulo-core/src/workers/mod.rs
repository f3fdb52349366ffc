// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-resource worker tables.
//!
//! One generic [`WorkerTable`] carries the lock/publish/cleanup logic; each
//! resource kind instantiates it with its own registration spec type and
//! adds whatever extra validation it needs (route conflicts for APIs, name
//! collisions and the cron engine for schedules, the live-connection
//! registry for websockets).
//!
//! Registration lifecycle, common to every kind: the worker server peeks a
//! stream's first frame, routes it here, and the serving function consumes
//! the registration, inserts the worker, publishes a snapshot, acknowledges,
//! and then blocks on the stream until it ends, which is the
//! unregistration signal.

pub mod apis;
pub mod batch;
pub mod http;
pub mod schedules;
pub mod storage;
pub mod topics;
pub mod websockets;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use cumulo_protocol::frame::Frame;
use cumulo_protocol::messages::RegistrationResponse;
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{StateTopic, TableSnapshot};
use crate::dispatch::WorkerChannel;
use crate::error::CoreError;

/// One registered worker for one resource.
pub struct Worker<S> {
    /// Generated worker id; the unregistration key.
    pub id: Uuid,
    /// Name of the declaring service.
    pub service: String,
    /// The registration spec, immutable once received.
    pub spec: S,
    /// Dispatch path back to the worker process.
    pub channel: Arc<dyn WorkerChannel>,
}

impl<S> Worker<S> {
    /// Create a worker with a fresh id.
    pub fn new(service: impl Into<String>, spec: S, channel: Arc<dyn WorkerChannel>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: service.into(),
            spec,
            channel,
        }
    }
}

impl<S: Clone> Clone for Worker<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            service: self.service.clone(),
            spec: self.spec.clone(),
            channel: self.channel.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Worker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Generic registration table:
/// resource name -> declaring service -> registered workers.
///
/// The nested map is exclusively owned by the table and mutated only under
/// its lock; every mutation is followed by a snapshot publication on the
/// table's state topic.
pub struct WorkerTable<S> {
    kind: &'static str,
    inner: RwLock<HashMap<String, HashMap<String, Vec<Worker<S>>>>>,
    topic: StateTopic<S>,
}

impl<S: Clone> WorkerTable<S> {
    /// Create an empty table. `kind` labels log lines and refresher counts.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: RwLock::new(HashMap::new()),
            topic: StateTopic::new(),
        }
    }

    /// The resource kind this table tracks.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Insert a worker and publish the new state.
    pub fn register(&self, resource: &str, worker: Worker<S>) {
        {
            let mut inner = self.inner.write().expect("worker table lock poisoned");
            info!(
                kind = self.kind,
                resource,
                service = %worker.service,
                worker = %worker.id,
                "worker registered"
            );
            inner
                .entry(resource.to_string())
                .or_default()
                .entry(worker.service.clone())
                .or_default()
                .push(worker);
        }
        self.publish();
    }

    /// Remove a worker and publish the new state.
    ///
    /// Unknown ids are safe no-ops: restart and hot-reload sequences can
    /// legitimately race an in-flight unregistration.
    pub fn unregister(&self, resource: &str, service: &str, worker_id: Uuid) {
        {
            let mut inner = self.inner.write().expect("worker table lock poisoned");
            let Some(services) = inner.get_mut(resource) else {
                debug!(kind = self.kind, resource, "unregister for unknown resource ignored");
                return;
            };
            if let Some(workers) = services.get_mut(service) {
                workers.retain(|w| w.id != worker_id);
                if workers.is_empty() {
                    services.remove(service);
                }
            }
            if services.is_empty() {
                inner.remove(resource);
            }
            info!(
                kind = self.kind,
                resource,
                service,
                worker = %worker_id,
                "worker unregistered"
            );
        }
        self.publish();
    }

    /// Current workers for a resource, across all services.
    ///
    /// Reads the live table so gateway routing always sees the current
    /// registration set rather than a stale snapshot.
    pub fn workers_for(&self, resource: &str) -> Vec<Worker<S>> {
        let inner = self.inner.read().expect("worker table lock poisoned");
        inner
            .get(resource)
            .map(|services| services.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of workers currently registered for a resource.
    pub fn worker_count(&self, resource: &str) -> usize {
        let inner = self.inner.read().expect("worker table lock poisoned");
        inner
            .get(resource)
            .map(|services| services.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Sorted, deduplicated resource names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("worker table lock poisoned");
        let mut names: Vec<String> = inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Defensive copy of the current state (specs only).
    pub fn snapshot(&self) -> TableSnapshot<S> {
        let inner = self.inner.read().expect("worker table lock poisoned");
        inner
            .iter()
            .map(|(resource, services)| {
                let services = services
                    .iter()
                    .map(|(service, workers)| {
                        (
                            service.clone(),
                            workers.iter().map(|w| w.spec.clone()).collect(),
                        )
                    })
                    .collect();
                (resource.clone(), services)
            })
            .collect()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<S>> {
        self.topic.subscribe()
    }

    fn publish(&self) {
        self.topic.publish(self.snapshot());
    }
}

/// Serve a validated registration for its whole lifetime.
///
/// Consumes the peeked registration frame, inserts the worker, acknowledges,
/// and holds the stream open; stream end unregisters.
pub(crate) async fn serve_registration<S, T>(
    table: &WorkerTable<S>,
    resource: &str,
    worker: Worker<S>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    S: Clone,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let worker_id = worker.id;
    let service = worker.service.clone();
    let kind = table.kind();
    table.register(resource, worker);
    acknowledge_and_hold(kind, stream, || {
        table.unregister(resource, &service, worker_id)
    })
    .await
}

/// Acknowledge an already-inserted registration and hold the stream open.
///
/// Consumes the peeked registration frame first, so the stream is positioned
/// past it. `unregister` runs exactly once, when the stream ends (or when
/// the acknowledgement itself fails because the worker already went away).
pub(crate) async fn acknowledge_and_hold<T, F>(
    kind: &'static str,
    mut stream: PeekableStream<T>,
    unregister: F,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce(),
{
    stream.recv().await?;

    let response = RegistrationResponse {
        success: true,
        error: String::new(),
    };
    if let Err(e) = stream.send(&Frame::response(&response)?).await {
        unregister();
        return Err(e.into());
    }

    wait_for_stream_end(kind, &mut stream).await;
    unregister();
    Ok(())
}

/// Reject a registration while keeping the stream alive so the worker can be
/// told about the outcome. The worker is never inserted, so the later stream
/// end does not unregister anything.
pub(crate) async fn reject_registration<T>(
    kind: &'static str,
    mut stream: PeekableStream<T>,
    error: &CoreError,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    stream.recv().await?;

    let response = RegistrationResponse {
        success: false,
        error: error.to_string(),
    };
    stream.send(&Frame::response(&response)?).await?;

    wait_for_stream_end(kind, &mut stream).await;
    Ok(())
}

/// Block until the registration stream ends. Registration streams carry no
/// further requests, so any frame that does arrive is logged and dropped.
pub(crate) async fn wait_for_stream_end<T>(kind: &'static str, stream: &mut PeekableStream<T>)
where
    T: AsyncRead + Unpin,
{
    loop {
        match stream.recv().await {
            Ok(_) => warn!(kind, "unexpected frame on registration stream ignored"),
            Err(e) => {
                debug!(kind, "registration stream ended: {}", e);
                break;
            }
        }
    }
}
