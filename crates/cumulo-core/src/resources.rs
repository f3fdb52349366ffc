// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource registrar.
//!
//! Tracks which services declared which cloud resources (buckets, topics,
//! queues, policies). The same logical resource can legitimately be declared
//! by multiple cooperating services, so each entry carries the ordered set
//! of requesting services; the entry dies when its last requestor is
//! cleared.
//!
//! "Resource not yet declared" is a normal transient state during startup,
//! so lookups on unknown names return empty zero values, never errors.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

/// A declared resource paired with the services that declared it.
#[derive(Debug, Clone)]
pub struct ResourceRegister<R> {
    /// The declared resource value (first declaration wins).
    pub resource: R,
    /// Services that declared the resource, in declaration order.
    pub requesting_services: Vec<String>,
}

/// Generic multi-requestor registry mapping resource names to declarations.
pub struct ResourceRegistrar<R> {
    kind: &'static str,
    inner: RwLock<HashMap<String, ResourceRegister<R>>>,
}

impl<R: Clone> ResourceRegistrar<R> {
    /// Create an empty registrar. `kind` only labels log lines.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `service` declared resource `name`.
    ///
    /// First declaration creates the entry; a duplicate (name, service) pair
    /// is an idempotent no-op; a new service is appended to the requestor
    /// list.
    pub fn register(&self, name: &str, service: &str, resource: R) {
        let mut inner = self.inner.write().expect("resource registrar lock poisoned");
        match inner.get_mut(name) {
            Some(entry) => {
                if entry.requesting_services.iter().any(|s| s == service) {
                    debug!(
                        kind = self.kind,
                        name, service, "duplicate resource declaration ignored"
                    );
                    return;
                }
                entry.requesting_services.push(service.to_string());
                info!(
                    kind = self.kind,
                    name,
                    service,
                    requestors = entry.requesting_services.len(),
                    "resource declared by additional service"
                );
            }
            None => {
                inner.insert(
                    name.to_string(),
                    ResourceRegister {
                        resource,
                        requesting_services: vec![service.to_string()],
                    },
                );
                info!(kind = self.kind, name, service, "resource declared");
            }
        }
    }

    /// Remove `service` from every resource's requestor list and delete any
    /// resource left with zero requestors. Safe to call repeatedly.
    pub fn clear_requesting_service(&self, service: &str) {
        let mut inner = self.inner.write().expect("resource registrar lock poisoned");
        let before = inner.len();
        inner.retain(|name, entry| {
            entry.requesting_services.retain(|s| s != service);
            if entry.requesting_services.is_empty() {
                debug!(kind = self.kind, name, "resource released (no requestors left)");
                false
            } else {
                true
            }
        });
        let removed = before - inner.len();
        if removed > 0 {
            info!(
                kind = self.kind,
                service, removed, "cleared resources for service"
            );
        }
    }

    /// The declared resource value, if any.
    pub fn get(&self, name: &str) -> Option<R> {
        let inner = self.inner.read().expect("resource registrar lock poisoned");
        inner.get(name).map(|entry| entry.resource.clone())
    }

    /// Services that declared `name`; empty for unknown names.
    pub fn requesting_services(&self, name: &str) -> Vec<String> {
        let inner = self.inner.read().expect("resource registrar lock poisoned");
        inner
            .get(name)
            .map(|entry| entry.requesting_services.clone())
            .unwrap_or_default()
    }

    /// Defensive copy of every entry, for safe iteration by subscribers.
    pub fn get_all(&self) -> HashMap<String, ResourceRegister<R>> {
        self.inner
            .read()
            .expect("resource registrar lock poisoned")
            .clone()
    }

    /// Number of declared resources.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("resource registrar lock poisoned")
            .len()
    }

    /// Whether the registrar is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
