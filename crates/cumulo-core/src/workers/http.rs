// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP proxy worker table.
//!
//! A proxy worker takes the whole inbound request for its host verbatim; no
//! route matching happens here.

use std::sync::Arc;

use anyhow::Result;
use cumulo_protocol::messages::HttpProxySpec;
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::bus::TableSnapshot;
use crate::dispatch::WorkerChannel;
use crate::workers::{Worker, WorkerTable, serve_registration};

/// Worker table for HTTP proxy hosts.
pub struct HttpProxyTable {
    table: WorkerTable<HttpProxySpec>,
}

impl HttpProxyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: WorkerTable::new("http"),
        }
    }

    /// The proxy worker for a host, if any (first registrant wins).
    pub fn proxy_for(&self, host: &str) -> Option<Worker<HttpProxySpec>> {
        self.table.workers_for(host).into_iter().next()
    }

    /// Sorted, deduplicated host names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<HttpProxySpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<HttpProxySpec>> {
        self.table.subscribe()
    }
}

impl Default for HttpProxyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve an HTTP proxy registration stream for its whole lifetime.
pub async fn serve_http_proxy_worker<T>(
    proxies: Arc<HttpProxyTable>,
    service: String,
    spec: HttpProxySpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let host = spec.host.clone();
    let worker = Worker::new(service, spec, channel);
    serve_registration(&proxies.table, &host, worker, stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::MockChannel;

    #[test]
    fn test_proxy_for_returns_first_registrant() {
        let proxies = HttpProxyTable::new();
        proxies.table.register(
            "storefront",
            Worker::new(
                "web",
                HttpProxySpec {
                    host: "storefront".to_string(),
                },
                Arc::new(MockChannel::http(200, "ok")),
            ),
        );

        assert!(proxies.proxy_for("storefront").is_some());
        assert!(proxies.proxy_for("unknown").is_none());
    }
}
