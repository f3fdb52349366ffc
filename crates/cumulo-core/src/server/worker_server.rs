// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-facing QUIC server.
//!
//! Accepts connections from SDK worker processes. Every worker-initiated
//! stream is wrapped in a [`PeekableStream`] so its first frame can be
//! inspected without being consumed: registrations are routed to the owning
//! worker table (which reads the registration itself), queue RPCs and
//! resource declarations are answered unary, and anything else is a
//! protocol violation that terminates only the offending stream.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use cumulo_protocol::frame::{Frame, FrameError};
use cumulo_protocol::messages::{
    DeclareResponse, QueueRequest, QueueResponse, RegistrationRequest, ResourceDeclaration,
    StreamRequest, queue_request, queue_response, registration_request, stream_request,
};
use cumulo_protocol::server::{ConnectionHandler, CumuloServer, ServerError, StreamHandler};
use cumulo_protocol::stream::{BiStream, PeekableStream};
use tracing::{debug, error, info, instrument, warn};

use crate::dispatch::QuicWorkerChannel;
use crate::error::CoreError;
use crate::plane::ControlPlane;
use crate::workers::apis::serve_api_worker;
use crate::workers::batch::serve_batch_worker;
use crate::workers::http::serve_http_proxy_worker;
use crate::workers::schedules::serve_schedule_worker;
use crate::workers::storage::serve_bucket_listener;
use crate::workers::topics::serve_subscription_worker;
use crate::workers::websockets::serve_websocket_worker;

/// The worker-facing QUIC server.
pub struct WorkerServer {
    server: CumuloServer,
}

impl WorkerServer {
    /// Bind the server (self-signed localhost certificate).
    pub fn bind(bind_addr: SocketAddr) -> Result<Self, ServerError> {
        Ok(Self {
            server: CumuloServer::localhost(bind_addr)?,
        })
    }

    /// The address the server actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.server.local_addr()
    }

    /// Accept and serve worker connections until the endpoint closes.
    pub async fn run(&self, plane: Arc<ControlPlane>) -> Result<()> {
        self.server
            .run(move |conn: ConnectionHandler| {
                let plane = plane.clone();
                async move {
                    handle_connection(conn, plane).await;
                }
            })
            .await?;
        Ok(())
    }
}

/// Bind and run the worker server in one call.
#[instrument(skip(plane))]
pub async fn run_worker_server(bind_addr: SocketAddr, plane: Arc<ControlPlane>) -> Result<()> {
    let server = WorkerServer::bind(bind_addr)?;
    info!(addr = %bind_addr, "worker QUIC server starting");
    server.run(plane).await
}

/// Handle a single worker connection.
#[instrument(skip(conn, plane), fields(remote = %conn.remote_address()))]
pub async fn handle_connection(conn: ConnectionHandler, plane: Arc<ControlPlane>) {
    info!("worker connection accepted");

    let connection = conn.connection();
    conn.run(move |stream: StreamHandler| {
        let plane = plane.clone();
        let connection = connection.clone();
        async move {
            if let Err(e) = handle_stream(stream, connection, plane).await {
                error!("stream error: {}", e);
            }
        }
    })
    .await;

    debug!("worker connection closed");
}

/// Route a single worker-initiated stream off its peeked first frame.
async fn handle_stream(
    stream: StreamHandler,
    connection: quinn::Connection,
    plane: Arc<ControlPlane>,
) -> Result<()> {
    let mut stream = PeekableStream::new(stream.into_bi());

    let decoded: Result<StreamRequest, String> = match stream.peek().await {
        Ok(frame) => frame
            .decode::<StreamRequest>()
            .map_err(|e| format!("undecodable frame: {}", e)),
        // Stream ended before the first frame: nothing was registered, so
        // there is nothing to clean up.
        Err(FrameError::ConnectionClosed) => return Ok(()),
        Err(e) => {
            debug!("stream failed before first frame: {}", e);
            return Ok(());
        }
    };
    let request = match decoded {
        Ok(request) => request,
        Err(reason) => return terminate_protocol_violation(stream, &reason).await,
    };

    match request.request {
        Some(stream_request::Request::Register(registration)) => {
            route_registration(registration, connection, plane, stream).await
        }
        Some(stream_request::Request::Queue(queue_request)) => {
            // Unary: consume the peeked frame, answer, done.
            stream.recv().await?;
            let response = handle_queue_request(&plane, queue_request);
            stream.send(&Frame::response(&response)?).await?;
            stream.finish().await?;
            Ok(())
        }
        Some(stream_request::Request::Declare(declaration)) => {
            stream.recv().await?;
            let response = handle_declaration(&plane, declaration);
            stream.send(&Frame::response(&response)?).await?;
            stream.finish().await?;
            Ok(())
        }
        None => terminate_protocol_violation(stream, "empty stream request").await,
    }
}

/// Hand a registration stream to the table owning its resource kind, with
/// the first frame still unread from the table's point of view.
async fn route_registration(
    registration: RegistrationRequest,
    connection: quinn::Connection,
    plane: Arc<ControlPlane>,
    stream: PeekableStream<BiStream>,
) -> Result<()> {
    let service = registration.service_name.clone();
    if service.is_empty() {
        return terminate_protocol_violation(stream, "registration without a service name").await;
    }

    let channel = Arc::new(QuicWorkerChannel::new(connection));

    match registration.resource {
        Some(registration_request::Resource::Api(spec)) => {
            serve_api_worker(plane.apis.clone(), service, spec, channel, stream).await
        }
        Some(registration_request::Resource::HttpProxy(spec)) => {
            serve_http_proxy_worker(plane.http.clone(), service, spec, channel, stream).await
        }
        Some(registration_request::Resource::Schedule(spec)) => {
            serve_schedule_worker(plane.schedules.clone(), service, spec, channel, stream).await
        }
        Some(registration_request::Resource::BucketListener(spec)) => {
            serve_bucket_listener(plane.buckets.clone(), service, spec, channel, stream).await
        }
        Some(registration_request::Resource::Websocket(spec)) => {
            serve_websocket_worker(plane.websockets.clone(), service, spec, channel, stream).await
        }
        Some(registration_request::Resource::Subscription(spec)) => {
            serve_subscription_worker(plane.topics.clone(), service, spec, channel, stream).await
        }
        Some(registration_request::Resource::BatchJob(spec)) => {
            serve_batch_worker(plane.jobs.clone(), service, spec, channel, stream).await
        }
        None => terminate_protocol_violation(stream, "registration without a resource").await,
    }
}

/// Answer a unary queue RPC. Failures are typed responses, never torn
/// streams, so the caller can retry with a fresh dequeue.
fn handle_queue_request(plane: &ControlPlane, request: QueueRequest) -> QueueResponse {
    use cumulo_protocol::messages::{CompleteResponse, DequeueResponse, EnqueueResponse};

    let result = match request.op {
        Some(queue_request::Op::Enqueue(enqueue)) => plane
            .queues
            .enqueue(&enqueue.queue, enqueue.messages)
            .map(|count| queue_response::Result::Enqueue(EnqueueResponse { count })),
        Some(queue_request::Op::Dequeue(dequeue)) => plane
            .queues
            .dequeue(&dequeue.queue, dequeue.depth)
            .map(|items| queue_response::Result::Dequeue(DequeueResponse { items })),
        Some(queue_request::Op::Complete(complete)) => plane
            .queues
            .complete(&complete.queue, &complete.lease_id)
            .map(|()| queue_response::Result::Complete(CompleteResponse {})),
        None => Err(CoreError::ValidationError {
            field: "op".to_string(),
            message: "queue request carried no operation".to_string(),
        }),
    };

    QueueResponse {
        result: Some(result.unwrap_or_else(|e| queue_response::Result::Error(e.to_rpc_error()))),
    }
}

/// Record a resource declaration.
fn handle_declaration(plane: &ControlPlane, declaration: ResourceDeclaration) -> DeclareResponse {
    if declaration.service_name.is_empty() || declaration.name.is_empty() {
        return DeclareResponse {
            success: false,
            error: "declaration requires a service name and a resource name".to_string(),
        };
    }

    let key = format!("{}/{}", declaration.kind, declaration.name);
    let service = declaration.service_name.clone();
    plane.resources.register(&key, &service, declaration);
    DeclareResponse {
        success: true,
        error: String::new(),
    }
}

/// Reject a stream whose first frame is not a valid stream request. Only the
/// offending stream dies; the connection and its other streams survive.
async fn terminate_protocol_violation(
    mut stream: PeekableStream<BiStream>,
    reason: &str,
) -> Result<()> {
    let violation = CoreError::ProtocolViolation {
        reason: reason.to_string(),
    };
    warn!("terminating stream: {}", violation);

    // Drain the buffered frame so the error frame is the next write.
    let _ = stream.recv().await;
    stream
        .send(&Frame::error(&violation.to_rpc_error())?)
        .await?;
    stream.finish().await?;
    Ok(())
}
