// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC server for the control plane.
//!
//! One server component accepts worker connections and routes each inbound
//! stream off its peeked first frame: registrations to the worker tables,
//! queue RPCs to the lease manager, declarations to the resource registrar.

pub mod worker_server;

pub use worker_server::{WorkerServer, run_worker_server};
