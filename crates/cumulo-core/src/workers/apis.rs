// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API route worker table.
//!
//! Tracks registered routes per API name, detects route conflicts across
//! services, and resolves inbound method+path pairs to a worker.
//!
//! Path specs support `:param` segments and a trailing `*` wildcard.

use std::sync::Arc;

use anyhow::Result;
use cumulo_protocol::messages::ApiRouteSpec;
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use uuid::Uuid;

use crate::bus::TableSnapshot;
use crate::dispatch::WorkerChannel;
use crate::error::{CoreError, ProjectErrors};
use crate::workers::{Worker, WorkerTable, reject_registration};

/// Worker table for API routes.
pub struct ApiWorkerTable {
    table: WorkerTable<ApiRouteSpec>,
    errors: Arc<ProjectErrors>,
}

impl ApiWorkerTable {
    /// Create an empty table; conflicts are recorded in `errors`.
    pub fn new(errors: Arc<ProjectErrors>) -> Self {
        Self {
            table: WorkerTable::new("api"),
            errors,
        }
    }

    /// Register a route unless it conflicts with one already registered by a
    /// different service (identical path, overlapping methods).
    pub fn try_register(&self, worker: Worker<ApiRouteSpec>) -> Result<(), CoreError> {
        let api = worker.spec.api.clone();
        if let Some(conflict) = self.find_conflict(&worker) {
            self.errors.record(conflict.clone());
            return Err(conflict);
        }
        self.table.register(&api, worker);
        Ok(())
    }

    fn find_conflict(&self, worker: &Worker<ApiRouteSpec>) -> Option<CoreError> {
        let existing = self.table.workers_for(&worker.spec.api);
        existing
            .iter()
            .find(|current| {
                current.service != worker.service
                    && current.spec.path == worker.spec.path
                    && methods_overlap(&current.spec.methods, &worker.spec.methods)
            })
            .map(|current| CoreError::RouteConflict {
                api: worker.spec.api.clone(),
                path: worker.spec.path.clone(),
                methods: overlapping_methods(&current.spec.methods, &worker.spec.methods),
                existing_service: current.service.clone(),
                service: worker.service.clone(),
            })
    }

    /// Resolve an inbound request to the worker owning the matching route.
    pub fn lookup_route(
        &self,
        api: &str,
        method: &str,
        path: &str,
    ) -> Option<Worker<ApiRouteSpec>> {
        let method = method.to_ascii_uppercase();
        self.table
            .workers_for(api)
            .into_iter()
            .find(|worker| {
                worker.spec.methods.iter().any(|m| *m == method)
                    && path_matches(&worker.spec.path, path)
            })
    }

    /// Sorted, deduplicated API names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Current workers for an API.
    pub fn workers_for(&self, api: &str) -> Vec<Worker<ApiRouteSpec>> {
        self.table.workers_for(api)
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<ApiRouteSpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<ApiRouteSpec>> {
        self.table.subscribe()
    }

    /// Remove a worker.
    pub fn unregister(&self, api: &str, service: &str, worker_id: Uuid) {
        self.table.unregister(api, service, worker_id);
    }
}

/// Serve an API route registration stream for its whole lifetime.
pub async fn serve_api_worker<T>(
    apis: Arc<ApiWorkerTable>,
    service: String,
    spec: ApiRouteSpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut spec = spec;
    for method in &mut spec.methods {
        *method = method.to_ascii_uppercase();
    }

    let worker = Worker::new(service, spec, channel);
    let api = worker.spec.api.clone();
    let service = worker.service.clone();
    let worker_id = worker.id;

    match apis.try_register(worker) {
        Ok(()) => {
            super::acknowledge_and_hold("api", stream, || {
                apis.unregister(&api, &service, worker_id)
            })
            .await
        }
        // Conflict: the stream is still accepted so the worker can be told
        // about the outcome, but the route is never activated.
        Err(conflict) => reject_registration("api", stream, &conflict).await,
    }
}

/// Whether two method sets share at least one method.
fn methods_overlap(a: &[String], b: &[String]) -> bool {
    a.iter().any(|m| b.contains(m))
}

fn overlapping_methods(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|m| b.contains(m)).cloned().collect()
}

/// Whether a registered path spec matches a concrete request path.
///
/// Segments match literally, `:param` segments match any single segment,
/// and a trailing `*` matches the rest of the path.
pub fn path_matches(spec: &str, path: &str) -> bool {
    let spec_segments: Vec<&str> = spec.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    for (index, spec_segment) in spec_segments.iter().enumerate() {
        if *spec_segment == "*" && index == spec_segments.len() - 1 {
            return true;
        }
        match path_segments.get(index) {
            Some(path_segment) => {
                if spec_segment.starts_with(':') {
                    continue;
                }
                if spec_segment != path_segment {
                    return false;
                }
            }
            None => return false,
        }
    }

    spec_segments.len() == path_segments.len()
}
