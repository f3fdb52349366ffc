// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reactive state bus.
//!
//! Every worker table publishes a defensive snapshot of its state on each
//! mutation; the gateway and the service-resource refresher subscribe. Each
//! table gets its own typed [`StateTopic`] so subscribers never see another
//! table's payloads; there is no untyped callback dispatch anywhere.
//!
//! `tokio::sync::watch` gives the exact semantics the control plane needs:
//! publication strictly follows the mutation that produced it, and a slow
//! subscriber coalesces rapid successive snapshots instead of queueing them.
//! Both subscribers reconcile from the full latest snapshot, so coalescing
//! is safe.

use std::collections::HashMap;

use tokio::sync::watch;

/// State snapshot of one worker table:
/// resource name -> declaring service -> registered specs.
///
/// Snapshots are defensive copies; a subscriber holding an old snapshot
/// never observes later table mutations through it.
pub type TableSnapshot<S> = HashMap<String, HashMap<String, Vec<S>>>;

/// A typed publish/subscribe topic for one table's snapshots.
pub struct StateTopic<S> {
    tx: watch::Sender<TableSnapshot<S>>,
}

impl<S: Clone> StateTopic<S> {
    /// Create a topic holding an empty initial snapshot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HashMap::new());
        Self { tx }
    }

    /// Publish a new snapshot, waking all subscribers.
    pub fn publish(&self, snapshot: TableSnapshot<S>) {
        self.tx.send_replace(snapshot);
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<S>> {
        self.tx.subscribe()
    }

    /// Clone the most recently published snapshot.
    pub fn latest(&self) -> TableSnapshot<S> {
        self.tx.borrow().clone()
    }
}

impl<S: Clone> Default for StateTopic<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-service worker counts in a snapshot.
pub fn service_worker_counts<S>(snapshot: &TableSnapshot<S>) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for services in snapshot.values() {
        for (service, workers) in services {
            *counts.entry(service.clone()).or_default() += workers.len();
        }
    }
    counts
}
