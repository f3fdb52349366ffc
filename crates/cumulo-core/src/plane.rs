// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared control-plane state.
//!
//! One [`ControlPlane`] is constructed at startup and shared (via `Arc`)
//! between the worker server, the gateway, and the refresher. Each field
//! owns its own lock; nothing reaches into another component's map.

use std::sync::Arc;

use cumulo_protocol::messages::ResourceDeclaration;

use crate::error::ProjectErrors;
use crate::queues::QueueManager;
use crate::resources::ResourceRegistrar;
use crate::workers::apis::ApiWorkerTable;
use crate::workers::batch::BatchJobTable;
use crate::workers::http::HttpProxyTable;
use crate::workers::schedules::ScheduleTable;
use crate::workers::storage::BucketListenerTable;
use crate::workers::topics::SubscriptionTable;
use crate::workers::websockets::WebsocketTable;

/// All per-resource state stores plus the registrar, queues, and error log.
pub struct ControlPlane {
    /// API route workers.
    pub apis: Arc<ApiWorkerTable>,
    /// HTTP proxy workers.
    pub http: Arc<HttpProxyTable>,
    /// Schedule workers and their cron tasks.
    pub schedules: Arc<ScheduleTable>,
    /// Bucket-change listeners.
    pub buckets: Arc<BucketListenerTable>,
    /// Websocket handlers and live connections.
    pub websockets: Arc<WebsocketTable>,
    /// Topic subscribers.
    pub topics: Arc<SubscriptionTable>,
    /// Batch job handlers.
    pub jobs: Arc<BatchJobTable>,
    /// Declared cloud resources, keyed `kind/name`.
    pub resources: Arc<ResourceRegistrar<ResourceDeclaration>>,
    /// Lease-based queues.
    pub queues: Arc<QueueManager>,
    /// Accumulated developer-facing errors.
    pub errors: Arc<ProjectErrors>,
}

impl ControlPlane {
    /// Construct an empty control plane.
    pub fn new() -> Arc<Self> {
        let errors = Arc::new(ProjectErrors::new());
        Arc::new(Self {
            apis: Arc::new(ApiWorkerTable::new(errors.clone())),
            http: Arc::new(HttpProxyTable::new()),
            schedules: Arc::new(ScheduleTable::new(errors.clone())),
            buckets: Arc::new(BucketListenerTable::new()),
            websockets: Arc::new(WebsocketTable::new()),
            topics: Arc::new(SubscriptionTable::new()),
            jobs: Arc::new(BatchJobTable::new()),
            resources: Arc::new(ResourceRegistrar::new("resource")),
            queues: Arc::new(QueueManager::new()),
            errors,
        })
    }
}
