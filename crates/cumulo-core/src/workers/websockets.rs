// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Websocket worker table and live-connection registry.
//!
//! Workers register per socket per event kind (connect/message/disconnect).
//! The gateway only serves a socket while it has at least one registered
//! handler, and registers each upgraded client connection here under a
//! freshly generated connection id until it disconnects.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use cumulo_protocol::messages::{WebsocketEventType, WebsocketSpec};
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::debug;

use crate::bus::TableSnapshot;
use crate::dispatch::WorkerChannel;
use crate::workers::{Worker, WorkerTable, serve_registration};

/// A live client connection on a served socket.
#[derive(Debug, Clone)]
pub struct WsConnection {
    /// Generated connection id.
    pub id: String,
    /// Socket the connection belongs to.
    pub socket: String,
    /// When the upgrade completed.
    pub connected_at: DateTime<Utc>,
}

/// Worker table for websocket handlers plus the live-connection registry.
pub struct WebsocketTable {
    table: WorkerTable<WebsocketSpec>,
    connections: RwLock<HashMap<String, HashMap<String, WsConnection>>>,
}

impl WebsocketTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: WorkerTable::new("websocket"),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// The handler registered for a socket and event kind, if any.
    pub fn handler_for(
        &self,
        socket: &str,
        event_type: WebsocketEventType,
    ) -> Option<Worker<WebsocketSpec>> {
        self.table
            .workers_for(socket)
            .into_iter()
            .find(|worker| worker.spec.event_type == event_type as i32)
    }

    /// Number of workers registered for a socket, across event kinds.
    ///
    /// A socket with zero workers is not servable; the gateway checks this
    /// before binding a listener.
    pub fn worker_count(&self, socket: &str) -> usize {
        self.table.worker_count(socket)
    }

    /// Track an upgraded client connection.
    pub fn register_connection(&self, socket: &str, connection_id: &str) {
        let mut connections = self.connections.write().expect("ws connection lock poisoned");
        connections.entry(socket.to_string()).or_default().insert(
            connection_id.to_string(),
            WsConnection {
                id: connection_id.to_string(),
                socket: socket.to_string(),
                connected_at: Utc::now(),
            },
        );
        debug!(socket, connection = connection_id, "websocket connection registered");
    }

    /// Drop a client connection. Safe to call twice.
    pub fn deregister_connection(&self, socket: &str, connection_id: &str) {
        let mut connections = self.connections.write().expect("ws connection lock poisoned");
        if let Some(for_socket) = connections.get_mut(socket) {
            for_socket.remove(connection_id);
            if for_socket.is_empty() {
                connections.remove(socket);
            }
        }
        debug!(socket, connection = connection_id, "websocket connection deregistered");
    }

    /// Number of live client connections on a socket.
    pub fn connection_count(&self, socket: &str) -> usize {
        self.connections
            .read()
            .expect("ws connection lock poisoned")
            .get(socket)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Defensive copy of the live connections on a socket.
    pub fn connections_for(&self, socket: &str) -> Vec<WsConnection> {
        self.connections
            .read()
            .expect("ws connection lock poisoned")
            .get(socket)
            .map(|for_socket| for_socket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted, deduplicated socket names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<WebsocketSpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<WebsocketSpec>> {
        self.table.subscribe()
    }

    /// Insert a worker directly, bypassing the registration stream.
    #[cfg(test)]
    pub(crate) fn register_for_test(&self, worker: Worker<WebsocketSpec>) {
        let socket = worker.spec.socket.clone();
        self.table.register(&socket, worker);
    }
}

impl Default for WebsocketTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve a websocket handler registration stream for its whole lifetime.
pub async fn serve_websocket_worker<T>(
    websockets: Arc<WebsocketTable>,
    service: String,
    spec: WebsocketSpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let socket = spec.socket.clone();
    let worker = Worker::new(service, spec, channel);
    serve_registration(&websockets.table, &socket, worker, stream).await
}
