// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared trigger listener.
//!
//! One fixed-port router exposing manual/external invocation of pub/sub,
//! scheduled, and batch-job workers:
//!
//! | Route                   | Effect                                     |
//! |-------------------------|--------------------------------------------|
//! | `POST /topics/{name}`   | publish the JSON body to every subscriber  |
//! | `POST /schedules/{name}`| fire one interval trigger                  |
//! | `POST /jobs/{name}`     | submit the JSON body to the job handler    |
//! | `GET /errors`           | list accumulated project errors            |
//!
//! Malformed JSON is 400, unknown names are 404, dispatch failures are 500,
//! success is a plain-text body.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use cumulo_protocol::messages::{
    JobSubmission, TopicMessage, TriggerRequest, trigger_request,
};
use tracing::info;

use crate::dispatch::expect_ack;
use crate::plane::ControlPlane;
use crate::workers::schedules::fire_schedule;

/// Build the trigger router.
pub fn router(plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .route("/topics/{name}", post(publish_topic))
        .route("/schedules/{name}", post(trigger_schedule))
        .route("/jobs/{name}", post(submit_job))
        .route("/errors", get(list_errors))
        .with_state(plane)
}

/// Serve the trigger router on a fixed address.
pub async fn serve(addr: SocketAddr, plane: Arc<ControlPlane>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "trigger listener started");
    axum::serve(listener, router(plane)).await?;
    Ok(())
}

async fn publish_topic(
    State(plane): State<Arc<ControlPlane>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            "request body must be a valid JSON object".to_string(),
        )
            .into_response();
    }

    let subscribers = plane.topics.subscribers_for(&name);
    if subscribers.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            format!("topic '{}' has no registered subscribers", name),
        )
            .into_response();
    }

    for subscriber in &subscribers {
        let message = TriggerRequest {
            trigger: Some(trigger_request::Trigger::Topic(TopicMessage {
                topic: name.clone(),
                payload: body.to_vec(),
            })),
        };
        if let Err(e) = expect_ack(subscriber.channel.as_ref(), message).await {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("delivery to service '{}' failed: {}", subscriber.service, e),
            )
                .into_response();
        }
    }

    (
        StatusCode::OK,
        format!(
            "published to {} subscriber(s) on topic '{}'",
            subscribers.len(),
            name
        ),
    )
        .into_response()
}

async fn trigger_schedule(
    State(plane): State<Arc<ControlPlane>>,
    Path(name): Path<String>,
) -> Response {
    let workers = plane.schedules.workers_for(&name);
    let Some(worker) = workers.first() else {
        return (
            StatusCode::NOT_FOUND,
            format!("schedule '{}' has no registered worker", name),
        )
            .into_response();
    };

    match fire_schedule(worker.channel.as_ref(), &name).await {
        Ok(()) => (StatusCode::OK, format!("triggered schedule '{}'", name)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("schedule dispatch failed: {}", e),
        )
            .into_response(),
    }
}

async fn submit_job(
    State(plane): State<Arc<ControlPlane>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            "request body must be a valid JSON object".to_string(),
        )
            .into_response();
    }

    let Some(handler) = plane.jobs.handler_for(&name) else {
        return (
            StatusCode::NOT_FOUND,
            format!("job '{}' has no registered handler", name),
        )
            .into_response();
    };

    let submission = TriggerRequest {
        trigger: Some(trigger_request::Trigger::Job(JobSubmission {
            job: name.clone(),
            payload: body.to_vec(),
        })),
    };
    match expect_ack(handler.channel.as_ref(), submission).await {
        Ok(()) => (StatusCode::OK, format!("submitted job '{}'", name)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("job dispatch failed: {}", e),
        )
            .into_response(),
    }
}

async fn list_errors(State(plane): State<Arc<ControlPlane>>) -> Response {
    let entries: Vec<serde_json::Value> = plane
        .errors
        .list()
        .into_iter()
        .map(|entry| {
            serde_json::json!({
                "occurred_at": entry.occurred_at.to_rfc3339(),
                "code": entry.error.error_code(),
                "message": entry.error.to_string(),
            })
        })
        .collect();
    Json(entries).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    // Axum routers are tower services, so tests drive them without binding
    // a socket.
    async fn call_router(router: Router, request: Request<Body>) -> Response {
        router.oneshot(request).await.expect("router call failed")
    }

    #[tokio::test]
    async fn test_topic_publish_rejects_malformed_json() {
        let plane = ControlPlane::new();
        let response = call_router(
            router(plane),
            Request::post("/topics/orders")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_topic_publish_without_subscribers_is_404() {
        let plane = ControlPlane::new();
        let response = call_router(
            router(plane),
            Request::post("/topics/orders")
                .body(Body::from("{\"id\": 1}"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_schedule_and_job_are_404() {
        let plane = ControlPlane::new();

        let response = call_router(
            router(plane.clone()),
            Request::post("/schedules/daily").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = call_router(
            router(plane),
            Request::post("/jobs/resize")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_errors_endpoint_lists_recorded_errors() {
        let plane = ControlPlane::new();
        plane
            .errors
            .record(crate::error::CoreError::InvalidDepth { depth: 11 });

        let response = call_router(
            router(plane),
            Request::get("/errors").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["code"], "INVALID_DEPTH");
    }
}
