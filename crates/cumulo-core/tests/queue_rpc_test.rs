// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end queue RPC tests over real QUIC.

mod common;

use common::start_worker_server;
use cumulo_protocol::client::CumuloClient;
use cumulo_protocol::messages::{
    CompleteRequest, DequeueRequest, EnqueueRequest, QueueRequest, QueueResponse, StreamRequest,
    queue_request, queue_response, stream_request,
};

async fn queue_rpc(client: &CumuloClient, op: queue_request::Op) -> queue_response::Result {
    let request = StreamRequest {
        request: Some(stream_request::Request::Queue(QueueRequest { op: Some(op) })),
    };
    let response: QueueResponse = client.request(&request).await.expect("queue rpc");
    response.result.expect("queue response payload")
}

#[tokio::test]
async fn queue_lease_round_trip() {
    let (_plane, addr, server) = start_worker_server().await;
    let client = CumuloClient::localhost(addr).unwrap();

    // Enqueue two messages.
    let result = queue_rpc(
        &client,
        queue_request::Op::Enqueue(EnqueueRequest {
            queue: "q".to_string(),
            messages: vec![b"a".to_vec(), b"b".to_vec()],
        }),
    )
    .await;
    assert!(matches!(result, queue_response::Result::Enqueue(ref r) if r.count == 2));

    // Dequeue with depth 1: "a" under a fresh lease.
    let first = match queue_rpc(
        &client,
        queue_request::Op::Dequeue(DequeueRequest {
            queue: "q".to_string(),
            depth: 1,
        }),
    )
    .await
    {
        queue_response::Result::Dequeue(r) => {
            assert_eq!(r.items.len(), 1);
            assert_eq!(r.items[0].payload, b"a");
            r.items[0].clone()
        }
        other => panic!("unexpected result: {:?}", other),
    };

    // "a" is leased, so the next dequeue returns "b".
    match queue_rpc(
        &client,
        queue_request::Op::Dequeue(DequeueRequest {
            queue: "q".to_string(),
            depth: 1,
        }),
    )
    .await
    {
        queue_response::Result::Dequeue(r) => {
            assert_eq!(r.items.len(), 1);
            assert_eq!(r.items[0].payload, b"b");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // Complete "a": removed exactly once.
    let result = queue_rpc(
        &client,
        queue_request::Op::Complete(CompleteRequest {
            queue: "q".to_string(),
            lease_id: first.lease_id.clone(),
        }),
    )
    .await;
    assert!(matches!(result, queue_response::Result::Complete(_)));

    // Completing the same lease again is LEASE_NOT_FOUND.
    match queue_rpc(
        &client,
        queue_request::Op::Complete(CompleteRequest {
            queue: "q".to_string(),
            lease_id: first.lease_id,
        }),
    )
    .await
    {
        queue_response::Result::Error(err) => assert_eq!(err.code, "LEASE_NOT_FOUND"),
        other => panic!("unexpected result: {:?}", other),
    }

    server.abort();
}

#[tokio::test]
async fn invalid_depth_is_a_typed_failure() {
    let (_plane, addr, server) = start_worker_server().await;
    let client = CumuloClient::localhost(addr).unwrap();

    match queue_rpc(
        &client,
        queue_request::Op::Dequeue(DequeueRequest {
            queue: "q".to_string(),
            depth: 11,
        }),
    )
    .await
    {
        queue_response::Result::Error(err) => {
            assert_eq!(err.code, "INVALID_DEPTH");
            assert!(err.message.contains("between 1 and 10"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    server.abort();
}
