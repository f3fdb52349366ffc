// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf message types for the cumulo wire protocol.
//!
//! These types are hand-maintained prost messages rather than build-script
//! codegen: the protocol is small, and keeping the definitions in Rust means
//! the crate builds without `protoc` and the types double as the control
//! plane's model objects.
//!
//! Stream kinds:
//! - A worker-initiated stream always starts with a [`StreamRequest`]:
//!   a long-lived registration, a unary queue RPC, or a unary resource
//!   declaration.
//! - A server-initiated stream carries exactly one [`TriggerRequest`] /
//!   [`TriggerResponse`] exchange.

use std::collections::HashMap;

// ============================================================================
// Stream envelope
// ============================================================================

/// First message on every worker-initiated stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamRequest {
    /// The request carried by this stream.
    #[prost(oneof = "stream_request::Request", tags = "1, 2, 3")]
    pub request: Option<stream_request::Request>,
}

/// Nested types for [`StreamRequest`].
pub mod stream_request {
    /// The kind of stream being opened.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Request {
        /// Long-lived worker registration; the stream stays open for the
        /// lifetime of the worker.
        #[prost(message, tag = "1")]
        Register(super::RegistrationRequest),
        /// Unary queue RPC.
        #[prost(message, tag = "2")]
        Queue(super::QueueRequest),
        /// Unary resource declaration.
        #[prost(message, tag = "3")]
        Declare(super::ResourceDeclaration),
    }
}

/// Generic error payload carried in error responses.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcError {
    /// Stable SCREAMING_SNAKE error code.
    #[prost(string, tag = "1")]
    pub code: String,
    /// Human-readable message.
    #[prost(string, tag = "2")]
    pub message: String,
}

// ============================================================================
// Registration
// ============================================================================

/// First message on a registration stream: declares what resource the
/// worker serves.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RegistrationRequest {
    /// Name of the service the worker process belongs to.
    #[prost(string, tag = "1")]
    pub service_name: String,
    /// The resource this worker handles.
    #[prost(oneof = "registration_request::Resource", tags = "2, 3, 4, 5, 6, 7, 8")]
    pub resource: Option<registration_request::Resource>,
}

/// Nested types for [`RegistrationRequest`].
pub mod registration_request {
    /// Resource-specific registration metadata.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Resource {
        /// An API route handler.
        #[prost(message, tag = "2")]
        Api(super::ApiRouteSpec),
        /// An HTTP proxy passthrough host.
        #[prost(message, tag = "3")]
        HttpProxy(super::HttpProxySpec),
        /// A schedule handler.
        #[prost(message, tag = "4")]
        Schedule(super::ScheduleSpec),
        /// A bucket-change listener.
        #[prost(message, tag = "5")]
        BucketListener(super::BucketListenerSpec),
        /// A websocket event handler.
        #[prost(message, tag = "6")]
        Websocket(super::WebsocketSpec),
        /// A topic subscription.
        #[prost(message, tag = "7")]
        Subscription(super::SubscriptionSpec),
        /// A batch job handler.
        #[prost(message, tag = "8")]
        BatchJob(super::BatchJobSpec),
    }
}

/// Registration metadata for one API route.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ApiRouteSpec {
    /// Name of the API the route belongs to.
    #[prost(string, tag = "1")]
    pub api: String,
    /// HTTP methods the route accepts (uppercase).
    #[prost(string, repeated, tag = "2")]
    pub methods: Vec<String>,
    /// Route path, possibly with `:param` segments or a trailing `*`.
    #[prost(string, tag = "3")]
    pub path: String,
}

/// Registration metadata for an HTTP proxy host.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpProxySpec {
    /// Logical host name the proxy serves.
    #[prost(string, tag = "1")]
    pub host: String,
}

/// Registration metadata for a schedule.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ScheduleSpec {
    /// Schedule name, unique across all services.
    #[prost(string, tag = "1")]
    pub schedule: String,
    /// How often the schedule fires.
    #[prost(oneof = "schedule_spec::Cadence", tags = "2, 3")]
    pub cadence: Option<schedule_spec::Cadence>,
}

/// Nested types for [`ScheduleSpec`].
pub mod schedule_spec {
    /// Schedule cadence: a plain rate or a cron expression.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Cadence {
        /// Rate expression such as `"5 minutes"` or `"1 days"`.
        #[prost(string, tag = "2")]
        Rate(String),
        /// Standard 5-field cron expression.
        #[prost(string, tag = "3")]
        Cron(String),
    }
}

/// Bucket event kinds a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BucketEventType {
    /// An object was written.
    Created = 0,
    /// An object was removed.
    Deleted = 1,
}

/// Registration metadata for a bucket-change listener.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BucketListenerSpec {
    /// Bucket the listener watches.
    #[prost(string, tag = "1")]
    pub bucket: String,
    /// Event kind the listener wants.
    #[prost(enumeration = "BucketEventType", tag = "2")]
    pub event_type: i32,
}

/// Websocket event kinds a handler can register for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WebsocketEventType {
    /// A client requests a new connection.
    Connect = 0,
    /// A client sent a message.
    Message = 1,
    /// A client disconnected.
    Disconnect = 2,
}

/// Registration metadata for a websocket event handler.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WebsocketSpec {
    /// Socket name the handler serves.
    #[prost(string, tag = "1")]
    pub socket: String,
    /// Event kind the handler wants.
    #[prost(enumeration = "WebsocketEventType", tag = "2")]
    pub event_type: i32,
}

/// Registration metadata for a topic subscription.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscriptionSpec {
    /// Topic name the subscriber listens on.
    #[prost(string, tag = "1")]
    pub topic: String,
}

/// Registration metadata for a batch job handler.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BatchJobSpec {
    /// Job name the handler serves.
    #[prost(string, tag = "1")]
    pub job: String,
}

/// Server response to a [`RegistrationRequest`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct RegistrationResponse {
    /// Whether the registration was activated.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Conflict or validation message when `success` is false.
    #[prost(string, tag = "2")]
    pub error: String,
}

// ============================================================================
// Triggers (server -> worker)
// ============================================================================

/// Multi-valued header or query entry.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ValueList {
    /// Values in arrival order.
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

/// An inbound HTTP request translated into the internal envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpRequest {
    /// HTTP method (uppercase).
    #[prost(string, tag = "1")]
    pub method: String,
    /// Request path without the query string.
    #[prost(string, tag = "2")]
    pub path: String,
    /// Request headers.
    #[prost(map = "string, message", tag = "3")]
    pub headers: HashMap<String, ValueList>,
    /// Decoded query parameters.
    #[prost(map = "string, message", tag = "4")]
    pub query: HashMap<String, ValueList>,
    /// Raw request body.
    #[prost(bytes = "vec", tag = "5")]
    pub body: Vec<u8>,
}

/// A worker's HTTP response envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpResponse {
    /// HTTP status code.
    #[prost(uint32, tag = "1")]
    pub status: u32,
    /// Response headers.
    #[prost(map = "string, message", tag = "2")]
    pub headers: HashMap<String, ValueList>,
    /// Raw response body.
    #[prost(bytes = "vec", tag = "3")]
    pub body: Vec<u8>,
}

/// A message published on a topic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TopicMessage {
    /// Topic name.
    #[prost(string, tag = "1")]
    pub topic: String,
    /// JSON payload as published.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// An interval trigger for a schedule (cron tick or manual).
#[derive(Clone, PartialEq, prost::Message)]
pub struct ScheduleTrigger {
    /// Schedule name.
    #[prost(string, tag = "1")]
    pub schedule: String,
}

/// A bucket-change notification.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BucketEvent {
    /// Bucket the change happened in.
    #[prost(string, tag = "1")]
    pub bucket: String,
    /// Object key that changed.
    #[prost(string, tag = "2")]
    pub key: String,
    /// What happened to the object.
    #[prost(enumeration = "BucketEventType", tag = "3")]
    pub event_type: i32,
}

/// A websocket lifecycle or message event.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WebsocketEvent {
    /// Socket the event belongs to.
    #[prost(string, tag = "1")]
    pub socket: String,
    /// Connection the event belongs to.
    #[prost(string, tag = "2")]
    pub connection_id: String,
    /// Event kind.
    #[prost(enumeration = "WebsocketEventType", tag = "3")]
    pub event_type: i32,
    /// Frame payload for message events; empty otherwise.
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
}

/// A batch job submission.
#[derive(Clone, PartialEq, prost::Message)]
pub struct JobSubmission {
    /// Job name.
    #[prost(string, tag = "1")]
    pub job: String,
    /// JSON payload as submitted.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// A trigger dispatched from the control plane to a worker.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TriggerRequest {
    /// The trigger payload.
    #[prost(oneof = "trigger_request::Trigger", tags = "1, 2, 3, 4, 5, 6")]
    pub trigger: Option<trigger_request::Trigger>,
}

/// Nested types for [`TriggerRequest`].
pub mod trigger_request {
    /// Trigger payload variants.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Trigger {
        /// An inbound HTTP request (API route or proxy passthrough).
        #[prost(message, tag = "1")]
        Http(super::HttpRequest),
        /// A topic message delivery.
        #[prost(message, tag = "2")]
        Topic(super::TopicMessage),
        /// A schedule interval trigger.
        #[prost(message, tag = "3")]
        Schedule(super::ScheduleTrigger),
        /// A bucket-change notification.
        #[prost(message, tag = "4")]
        Bucket(super::BucketEvent),
        /// A websocket event.
        #[prost(message, tag = "5")]
        Websocket(super::WebsocketEvent),
        /// A batch job submission.
        #[prost(message, tag = "6")]
        Job(super::JobSubmission),
    }
}

/// A worker's acknowledgement of a non-HTTP trigger.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TriggerAck {
    /// Whether the worker handled the trigger.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Failure detail when `success` is false.
    #[prost(string, tag = "2")]
    pub error: String,
}

/// A websocket handler's verdict on a connect/message/disconnect event.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WebsocketEventResponse {
    /// For connect events: whether the connection is accepted.
    #[prost(bool, tag = "1")]
    pub accept: bool,
    /// Rejection reason when `accept` is false.
    #[prost(string, tag = "2")]
    pub reason: String,
}

/// A worker's response to a [`TriggerRequest`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct TriggerResponse {
    /// The response payload.
    #[prost(oneof = "trigger_response::Result", tags = "1, 2, 3")]
    pub result: Option<trigger_response::Result>,
}

/// Nested types for [`TriggerResponse`].
pub mod trigger_response {
    /// Trigger response variants.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Result {
        /// Response to an HTTP trigger.
        #[prost(message, tag = "1")]
        Http(super::HttpResponse),
        /// Acknowledgement of a topic/schedule/bucket/job trigger.
        #[prost(message, tag = "2")]
        Ack(super::TriggerAck),
        /// Verdict on a websocket event.
        #[prost(message, tag = "3")]
        Websocket(super::WebsocketEventResponse),
    }
}

// ============================================================================
// Queues
// ============================================================================

/// Enqueue messages onto a named queue.
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnqueueRequest {
    /// Queue name; created lazily on first use.
    #[prost(string, tag = "1")]
    pub queue: String,
    /// Message payloads, appended in order.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub messages: Vec<Vec<u8>>,
}

/// Result of an enqueue.
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnqueueResponse {
    /// Number of messages appended.
    #[prost(uint32, tag = "1")]
    pub count: u32,
}

/// Lease up to `depth` messages from a named queue.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DequeueRequest {
    /// Queue name.
    #[prost(string, tag = "1")]
    pub queue: String,
    /// Maximum number of messages to lease (1..=10).
    #[prost(uint32, tag = "2")]
    pub depth: u32,
}

/// A message under a live lease.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LeasedMessage {
    /// Lease id to pass back to Complete.
    #[prost(string, tag = "1")]
    pub lease_id: String,
    /// Message payload.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// Result of a dequeue.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DequeueResponse {
    /// Leased messages, oldest first.
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<LeasedMessage>,
}

/// Remove a leased message from its queue.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CompleteRequest {
    /// Queue name.
    #[prost(string, tag = "1")]
    pub queue: String,
    /// Lease id returned by Dequeue.
    #[prost(string, tag = "2")]
    pub lease_id: String,
}

/// Result of a complete.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CompleteResponse {}

/// A unary queue RPC.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueueRequest {
    /// The queue operation.
    #[prost(oneof = "queue_request::Op", tags = "1, 2, 3")]
    pub op: Option<queue_request::Op>,
}

/// Nested types for [`QueueRequest`].
pub mod queue_request {
    /// Queue operation variants.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Op {
        /// Append messages.
        #[prost(message, tag = "1")]
        Enqueue(super::EnqueueRequest),
        /// Lease messages.
        #[prost(message, tag = "2")]
        Dequeue(super::DequeueRequest),
        /// Remove a leased message.
        #[prost(message, tag = "3")]
        Complete(super::CompleteRequest),
    }
}

/// Response to a [`QueueRequest`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueueResponse {
    /// The operation result.
    #[prost(oneof = "queue_response::Result", tags = "1, 2, 3, 4")]
    pub result: Option<queue_response::Result>,
}

/// Nested types for [`QueueResponse`].
pub mod queue_response {
    /// Queue response variants.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Result {
        /// Enqueue succeeded.
        #[prost(message, tag = "1")]
        Enqueue(super::EnqueueResponse),
        /// Dequeue succeeded (possibly with zero items).
        #[prost(message, tag = "2")]
        Dequeue(super::DequeueResponse),
        /// Complete succeeded.
        #[prost(message, tag = "3")]
        Complete(super::CompleteResponse),
        /// The operation failed; queue state is unchanged.
        #[prost(message, tag = "4")]
        Error(super::RpcError),
    }
}

// ============================================================================
// Resource declarations
// ============================================================================

/// A service declaring its use of a cloud resource.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ResourceDeclaration {
    /// Name of the declaring service.
    #[prost(string, tag = "1")]
    pub service_name: String,
    /// Resource kind, e.g. `bucket`, `topic`, `queue`, `policy`.
    #[prost(string, tag = "2")]
    pub kind: String,
    /// Resource name, unique within its kind.
    #[prost(string, tag = "3")]
    pub name: String,
    /// Resource-specific configuration as JSON; may be empty.
    #[prost(bytes = "vec", tag = "4")]
    pub config_json: Vec<u8>,
}

/// Server response to a [`ResourceDeclaration`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeclareResponse {
    /// Whether the declaration was recorded.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Failure detail when `success` is false.
    #[prost(string, tag = "2")]
    pub error: String,
}
