// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for end-to-end tests over real QUIC.

// Each test binary compiles this module independently and uses a subset.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cumulo_core::plane::ControlPlane;
use cumulo_core::server::WorkerServer;
use cumulo_protocol::client::CumuloClient;
use cumulo_protocol::frame::{Frame, read_frame, write_frame};
use cumulo_protocol::messages::{
    HttpResponse, RegistrationRequest, RegistrationResponse, StreamRequest, TriggerRequest,
    TriggerResponse, stream_request, trigger_response,
};
use cumulo_protocol::stream::BiStream;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// Bind a worker server on an ephemeral port and serve a fresh plane.
pub async fn start_worker_server() -> (Arc<ControlPlane>, SocketAddr, JoinHandle<()>) {
    let plane = ControlPlane::new();
    let server = WorkerServer::bind("127.0.0.1:0".parse().unwrap()).expect("bind worker server");
    let addr = server.local_addr().expect("server addr");

    let serve_plane = plane.clone();
    let handle = tokio::spawn(async move {
        let _ = server.run(serve_plane).await;
    });

    (plane, addr, handle)
}

/// Open a registration stream, send the registration, and return the
/// still-open stream plus the server's response. Dropping the stream is the
/// unregistration signal.
pub async fn register_worker(
    client: &CumuloClient,
    registration: RegistrationRequest,
) -> (BiStream, RegistrationResponse) {
    let mut stream = client.open_stream().await.expect("open stream");

    let request = StreamRequest {
        request: Some(stream_request::Request::Register(registration)),
    };
    write_frame(&mut stream, &Frame::request(&request).unwrap())
        .await
        .expect("send registration");

    let frame = read_frame(&mut stream).await.expect("registration response");
    let response: RegistrationResponse = frame.decode().expect("decode response");
    (stream, response)
}

/// Serve trigger streams on the worker side: every server-initiated stream
/// gets one canned HTTP response.
pub fn spawn_http_responder(
    client: Arc<CumuloClient>,
    status: u32,
    body: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(mut stream) = client.accept_stream().await {
            tokio::spawn(async move {
                let Ok(frame) = read_frame(&mut stream).await else {
                    return;
                };
                let Ok(_request) = frame.decode::<TriggerRequest>() else {
                    return;
                };
                let response = TriggerResponse {
                    result: Some(trigger_response::Result::Http(HttpResponse {
                        status,
                        headers: Default::default(),
                        body: body.as_bytes().to_vec(),
                    })),
                };
                let _ = write_frame(&mut stream, &Frame::response(&response).unwrap()).await;
                let _ = stream.shutdown().await;
            });
        }
    })
}

/// Poll until `check` passes or the deadline expires.
pub async fn wait_until<F>(description: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", description);
}
