// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end gateway tests: a worker registers over QUIC, the gateway
//! binds a listener, and external HTTP traffic flows through to the worker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{register_worker, spawn_http_responder, start_worker_server, wait_until};
use cumulo_core::gateway::Gateway;
use cumulo_core::gateway::ports::PortMap;
use cumulo_protocol::client::CumuloClient;
use cumulo_protocol::messages::{
    ApiRouteSpec, RegistrationRequest, registration_request,
};

#[tokio::test]
async fn http_request_round_trip_through_gateway() {
    let (plane, addr, server) = start_worker_server().await;

    let gateway = Gateway::new(plane.clone(), PortMap::default());
    let gateway_task = tokio::spawn(gateway.clone().run());

    // A worker registers a route and answers trigger streams.
    let client = Arc::new(CumuloClient::localhost(addr).unwrap());
    let responder = spawn_http_responder(client.clone(), 200, "hello from worker");
    let (stream, response) = register_worker(
        &client,
        RegistrationRequest {
            service_name: "orders".to_string(),
            resource: Some(registration_request::Resource::Api(ApiRouteSpec {
                api: "public".to_string(),
                methods: vec!["GET".to_string()],
                path: "/hello".to_string(),
            })),
        },
    )
    .await;
    assert!(response.success);

    // Reconciliation binds a listener for the API.
    let mut port = None;
    for _ in 0..500 {
        if let Some(bound) = gateway.api_port("public").await {
            port = Some(bound);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let port = port.expect("api listener bound");

    // Matching route: the worker's response comes back verbatim.
    let response = reqwest::get(format!("http://127.0.0.1:{}/hello", port))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "hello from worker");

    // Unmatched route: 404 with an explanation, not a connection error.
    let response = reqwest::get(format!("http://127.0.0.1:{}/missing", port))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().contains("no route"));

    // The last worker unregisters: the listener goes away entirely, so a
    // new connection is refused rather than served a stale 404.
    drop(stream);
    let mut removed = false;
    for _ in 0..500 {
        if gateway.api_port("public").await.is_none() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(removed, "api listener should be removed");
    assert!(
        tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_err()
    );

    responder.abort();
    gateway_task.abort();
    server.abort();
}

#[tokio::test]
async fn topic_trigger_fans_out_to_subscriber() {
    let (plane, addr, server) = start_worker_server().await;

    let client = Arc::new(CumuloClient::localhost(addr).unwrap());

    // Subscriber worker acking every trigger.
    let responder = {
        use cumulo_protocol::frame::{Frame, read_frame, write_frame};
        use cumulo_protocol::messages::{TriggerAck, TriggerResponse, trigger_response};
        use tokio::io::AsyncWriteExt;

        let client = client.clone();
        tokio::spawn(async move {
            while let Ok(mut stream) = client.accept_stream().await {
                let Ok(_frame) = read_frame(&mut stream).await else {
                    continue;
                };
                let response = TriggerResponse {
                    result: Some(trigger_response::Result::Ack(TriggerAck {
                        success: true,
                        error: String::new(),
                    })),
                };
                let _ = write_frame(&mut stream, &Frame::response(&response).unwrap()).await;
                let _ = stream.shutdown().await;
            }
        })
    };

    let (_stream, response) = register_worker(
        &client,
        RegistrationRequest {
            service_name: "orders".to_string(),
            resource: Some(registration_request::Resource::Subscription(
                cumulo_protocol::messages::SubscriptionSpec {
                    topic: "order-created".to_string(),
                },
            )),
        },
    )
    .await;
    assert!(response.success);
    wait_until("subscriber registered", || {
        !plane.topics.subscribers_for("order-created").is_empty()
    })
    .await;

    // Serve the trigger router on an ephemeral port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let trigger_port = listener.local_addr().unwrap().port();
    let router = cumulo_core::gateway::triggers::router(plane.clone());
    let trigger_task = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let http = reqwest::Client::new();

    // Malformed JSON is 400.
    let response = http
        .post(format!("http://127.0.0.1:{}/topics/order-created", trigger_port))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Valid JSON publishes to the subscriber.
    let response = http
        .post(format!("http://127.0.0.1:{}/topics/order-created", trigger_port))
        .body("{\"order\": 42}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().contains("1 subscriber"));

    // Unknown topic is 404.
    let response = http
        .post(format!("http://127.0.0.1:{}/topics/ghost", trigger_port))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    responder.abort();
    trigger_task.abort();
    server.abort();
}
