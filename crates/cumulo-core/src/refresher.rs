// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service-resource refresher.
//!
//! Subscribes to every worker table and recomputes per-service worker
//! counts in full from each incoming snapshot. When a service's aggregate
//! count transitions from >0 to 0 (a hot-reload or shutdown), its declared
//! resources are cleared exactly once; the transition edge is tracked so
//! replayed snapshots and unregistration races stay idempotent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cumulo_protocol::messages::ResourceDeclaration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bus::service_worker_counts;
use crate::plane::ControlPlane;
use crate::resources::ResourceRegistrar;

/// Aggregates per-service worker counts across all resource tables.
pub struct ServiceResourceRefresher {
    resources: Arc<ResourceRegistrar<ResourceDeclaration>>,
    per_kind: Mutex<HashMap<&'static str, HashMap<String, usize>>>,
}

impl ServiceResourceRefresher {
    /// Create a refresher that clears resources through `resources`.
    pub fn new(resources: Arc<ResourceRegistrar<ResourceDeclaration>>) -> Arc<Self> {
        Arc::new(Self {
            resources,
            per_kind: Mutex::new(HashMap::new()),
        })
    }

    /// Replace one kind's per-service counts with a freshly computed set and
    /// clear resources for services whose aggregate dropped to zero.
    pub fn apply(&self, kind: &'static str, counts: HashMap<String, usize>) {
        let went_idle = {
            let mut per_kind = self.per_kind.lock().expect("refresher lock poisoned");

            let before = Self::totals(&per_kind);
            per_kind.insert(kind, counts);
            let after = Self::totals(&per_kind);

            before
                .into_iter()
                .filter(|(service, total)| {
                    *total > 0 && after.get(service).copied().unwrap_or(0) == 0
                })
                .map(|(service, _)| service)
                .collect::<Vec<_>>()
        };

        for service in went_idle {
            info!(service = %service, "service has no active workers; clearing its resources");
            self.resources.clear_requesting_service(&service);
        }
    }

    fn totals(per_kind: &HashMap<&'static str, HashMap<String, usize>>) -> HashMap<String, usize> {
        let mut totals: HashMap<String, usize> = HashMap::new();
        for counts in per_kind.values() {
            for (service, count) in counts {
                *totals.entry(service.clone()).or_default() += count;
            }
        }
        totals
    }

    /// Subscribe to every worker table and apply snapshots as they arrive.
    pub fn spawn(self: &Arc<Self>, plane: &ControlPlane) -> JoinHandle<()> {
        let refresher = self.clone();
        let mut apis = plane.apis.subscribe();
        let mut http = plane.http.subscribe();
        let mut schedules = plane.schedules.subscribe();
        let mut buckets = plane.buckets.subscribe();
        let mut websockets = plane.websockets.subscribe();
        let mut topics = plane.topics.subscribe();
        let mut jobs = plane.jobs.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = apis.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("api", service_worker_counts(&apis.borrow_and_update()));
                    }
                    changed = http.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("http", service_worker_counts(&http.borrow_and_update()));
                    }
                    changed = schedules.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("schedule", service_worker_counts(&schedules.borrow_and_update()));
                    }
                    changed = buckets.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("listener", service_worker_counts(&buckets.borrow_and_update()));
                    }
                    changed = websockets.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("websocket", service_worker_counts(&websockets.borrow_and_update()));
                    }
                    changed = topics.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("subscriber", service_worker_counts(&topics.borrow_and_update()));
                    }
                    changed = jobs.changed() => {
                        if changed.is_err() { break; }
                        refresher.apply("batch", service_worker_counts(&jobs.borrow_and_update()));
                    }
                }
            }
            debug!("refresher stopped: all table topics closed");
        })
    }
}
