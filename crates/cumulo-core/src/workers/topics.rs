// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topic subscription worker table.

use std::sync::Arc;

use anyhow::Result;
use cumulo_protocol::messages::SubscriptionSpec;
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::bus::TableSnapshot;
use crate::dispatch::WorkerChannel;
use crate::workers::{Worker, WorkerTable, serve_registration};

/// Worker table for topic subscriptions.
pub struct SubscriptionTable {
    table: WorkerTable<SubscriptionSpec>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: WorkerTable::new("subscriber"),
        }
    }

    /// Every subscriber registered for a topic.
    pub fn subscribers_for(&self, topic: &str) -> Vec<Worker<SubscriptionSpec>> {
        self.table.workers_for(topic)
    }

    /// Sorted, deduplicated topic names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<SubscriptionSpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<SubscriptionSpec>> {
        self.table.subscribe()
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve a topic subscription registration stream for its whole lifetime.
pub async fn serve_subscription_worker<T>(
    topics: Arc<SubscriptionTable>,
    service: String,
    spec: SubscriptionSpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let topic = spec.topic.clone();
    let worker = Worker::new(service, spec, channel);
    serve_registration(&topics.table, &topic, worker, stream).await
}
