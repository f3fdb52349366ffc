// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cumulo Protocol - QUIC + Protobuf communication layer
//!
//! This crate provides the wire protocol between SDK worker processes and the
//! cumulo local control plane.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    cumulo-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RPC Layer: Registration Streams + Unary Request/Response   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: Protobuf (prost)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn)                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Stream kinds
//!
//! Every worker-initiated stream opens with a [`messages::StreamRequest`]:
//!
//! - **Registration**: the first frame declares the resource the worker
//!   serves (API route, proxy host, schedule, bucket listener, websocket
//!   handler, topic subscription, batch job). The stream then stays open for
//!   the worker's lifetime; its end is the unregistration signal.
//! - **Queue RPC**: unary Enqueue/Dequeue/Complete.
//! - **Resource declaration**: unary, records a service's use of a bucket,
//!   topic, queue, or policy.
//!
//! Trigger dispatch flows the other way: the control plane opens a
//! bidirectional stream toward the worker and runs one
//! [`messages::TriggerRequest`] / [`messages::TriggerResponse`] exchange.
//!
//! The [`stream::PeekableStream`] adapter lets the control plane inspect the
//! first frame of an inbound stream to decide how to route it, then hand the
//! stream to a handler that still sees that frame as unread.

pub mod client;
pub mod frame;
pub mod messages;
pub mod server;
pub mod stream;

// Re-export main types
pub use client::{ClientError, CumuloClient, CumuloClientConfig};
pub use frame::{Frame, FrameError, FramedStream, MessageType};
pub use server::{ConnectionHandler, CumuloServer, CumuloServerConfig, ServerError, StreamHandler};
pub use stream::{BiStream, PeekableStream};
