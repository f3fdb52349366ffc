// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cumulo Core - Local Cloud Control Plane
//!
//! Cumulo lets services written against a cloud-resource SDK run locally:
//! worker processes register over QUIC for the resources they serve, and
//! this crate turns that topology into live HTTP/WebSocket listeners,
//! ticking schedules, topic delivery, and lease-based queues, speaking the
//! same wire protocol the services expect in production.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     SDK Worker Processes                         │
//! │        (API routes, proxies, schedules, listeners, sockets)      │
//! └──────────────────────────────────────────────────────────────────┘
//!          │ registration streams                ▲ trigger streams
//!          ▼                                     │
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Worker QUIC Server                          │
//! │      peek first frame -> route: Register | Queue | Declare       │
//! └──────────────────────────────────────────────────────────────────┘
//!          │ register/unregister
//!          ▼
//! ┌───────────────────┐   snapshots   ┌───────────────────────────────┐
//! │   Worker Tables   │──────────────▶│        State Bus (watch)      │
//! │ apis/http/sched/  │               └───────────────┬───────────────┘
//! │ buckets/ws/topics │                      ┌────────┴─────────┐
//! │ /jobs             │                      ▼                  ▼
//! └───────────────────┘              ┌──────────────┐   ┌──────────────┐
//!                                    │   Gateway    │   │  Refresher   │
//!                                    │ per-resource │   │ clears idle  │
//!                                    │  listeners   │   │  services'   │
//!                                    │  + triggers  │   │  resources   │
//!                                    └──────────────┘   └──────────────┘
//! ```
//!
//! # Stream routing
//!
//! | First frame            | Handling                                     |
//! |------------------------|----------------------------------------------|
//! | `Register(...)`        | long-lived; stream end = unregistration      |
//! | `Queue(...)`           | unary enqueue/dequeue/complete               |
//! | `Declare(...)`         | unary resource declaration                   |
//! | anything else          | protocol error; only that stream terminates  |
//!
//! # Gateway surface
//!
//! - One listener per API name (method+path routing against the live table)
//! - One listener per HTTP-proxy host (verbatim passthrough)
//! - One listener per servable websocket socket (connect/message/disconnect)
//! - A shared trigger listener: `POST /topics/{name}`, `POST
//!   /schedules/{name}`, `POST /jobs/{name}`, `GET /errors`
//!
//! Listener sets are reconciled by full rebuild on every table snapshot.
//!
//! # Configuration
//!
//! | Variable              | Default | Description                        |
//! |-----------------------|---------|------------------------------------|
//! | `CUMULO_WORKER_PORT`  | `7420`  | Worker QUIC server port            |
//! | `CUMULO_TRIGGER_PORT` | `7421`  | Trigger HTTP listener port         |
//! | `CUMULO_PORTS_FILE`   | -       | Optional JSON port-map file        |

/// Reactive state bus: typed per-table snapshot topics.
pub mod bus;

/// Configuration from environment variables.
pub mod config;

/// Trigger dispatch to workers over server-initiated streams.
pub mod dispatch;

/// Error types and the accumulated project-error log.
pub mod error;

/// Gateway: listener reconciliation, HTTP/WebSocket serving, triggers.
pub mod gateway;

/// Shared control-plane state.
pub mod plane;

/// Lease-based in-memory queues.
pub mod queues;

/// Service-resource refresher.
pub mod refresher;

/// Resource registrar.
pub mod resources;

/// Worker-facing QUIC server.
pub mod server;

/// Per-resource worker tables.
pub mod workers;
