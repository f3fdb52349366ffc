// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bucket-change listener table.
//!
//! Storage engines call [`BucketListenerTable::notify`] after a write or
//! delete; the table fans the event out to every listener registered for
//! that bucket and event kind.

use std::sync::Arc;

use anyhow::Result;
use cumulo_protocol::messages::{
    BucketEvent, BucketEventType, BucketListenerSpec, TriggerRequest, trigger_request,
};
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::warn;

use crate::bus::TableSnapshot;
use crate::dispatch::{WorkerChannel, expect_ack};
use crate::workers::{Worker, WorkerTable, serve_registration};

/// Worker table for bucket-change listeners.
pub struct BucketListenerTable {
    table: WorkerTable<BucketListenerSpec>,
}

impl BucketListenerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: WorkerTable::new("listener"),
        }
    }

    /// Listeners registered for a bucket and event kind.
    pub fn listeners_for(
        &self,
        bucket: &str,
        event_type: BucketEventType,
    ) -> Vec<Worker<BucketListenerSpec>> {
        self.table
            .workers_for(bucket)
            .into_iter()
            .filter(|worker| worker.spec.event_type == event_type as i32)
            .collect()
    }

    /// Deliver a bucket event to every matching listener.
    ///
    /// Returns the number of listeners notified; individual dispatch
    /// failures are logged and do not stop the fan-out.
    pub async fn notify(
        &self,
        bucket: &str,
        key: &str,
        event_type: BucketEventType,
    ) -> Result<usize> {
        let listeners = self.listeners_for(bucket, event_type);
        let mut notified = 0;
        for listener in &listeners {
            let event = TriggerRequest {
                trigger: Some(trigger_request::Trigger::Bucket(BucketEvent {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    event_type: event_type as i32,
                })),
            };
            match expect_ack(listener.channel.as_ref(), event).await {
                Ok(()) => notified += 1,
                Err(e) => warn!(
                    bucket,
                    key,
                    service = %listener.service,
                    "bucket listener dispatch failed: {}",
                    e
                ),
            }
        }
        Ok(notified)
    }

    /// Sorted, deduplicated bucket names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<BucketListenerSpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<BucketListenerSpec>> {
        self.table.subscribe()
    }
}

impl Default for BucketListenerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve a bucket listener registration stream for its whole lifetime.
pub async fn serve_bucket_listener<T>(
    buckets: Arc<BucketListenerTable>,
    service: String,
    spec: BucketListenerSpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let bucket = spec.bucket.clone();
    let worker = Worker::new(service, spec, channel);
    serve_registration(&buckets.table, &bucket, worker, stream).await
}
