// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch job worker table.

use std::sync::Arc;

use anyhow::Result;
use cumulo_protocol::messages::BatchJobSpec;
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::bus::TableSnapshot;
use crate::dispatch::WorkerChannel;
use crate::workers::{Worker, WorkerTable, serve_registration};

/// Worker table for batch job handlers.
pub struct BatchJobTable {
    table: WorkerTable<BatchJobSpec>,
}

impl BatchJobTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: WorkerTable::new("batch"),
        }
    }

    /// The handler for a job, if any (first registrant wins).
    pub fn handler_for(&self, job: &str) -> Option<Worker<BatchJobSpec>> {
        self.table.workers_for(job).into_iter().next()
    }

    /// Sorted, deduplicated job names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<BatchJobSpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<BatchJobSpec>> {
        self.table.subscribe()
    }
}

impl Default for BatchJobTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve a batch job registration stream for its whole lifetime.
pub async fn serve_batch_worker<T>(
    jobs: Arc<BatchJobTable>,
    service: String,
    spec: BatchJobSpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let job = spec.job.clone();
    let worker = Worker::new(service, spec, channel);
    serve_registration(&jobs.table, &job, worker, stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::MockChannel;

    #[test]
    fn test_handler_for_returns_first_registrant() {
        let jobs = BatchJobTable::new();
        jobs.table.register(
            "resize-images",
            Worker::new(
                "media",
                BatchJobSpec {
                    job: "resize-images".to_string(),
                },
                Arc::new(MockChannel::ack()),
            ),
        );

        assert!(jobs.handler_for("resize-images").is_some());
        assert!(jobs.handler_for("unknown").is_none());
    }
}
