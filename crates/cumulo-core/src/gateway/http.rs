// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP serving for API and proxy listeners.
//!
//! Translates inbound HTTP traffic into the internal request envelope,
//! resolves it against the current worker tables, and copies the worker's
//! response back onto the wire. Routing misses are 404s with a
//! developer-facing explanation (expected during hot-reload windows);
//! dispatch failures are 500s and never retried.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use cumulo_protocol::messages::{
    HttpRequest, HttpResponse, TriggerRequest, ValueList, trigger_request, trigger_response,
};
use tracing::warn;

use crate::dispatch::WorkerChannel;
use crate::plane::ControlPlane;

/// Largest accepted request body; matches the wire frame limit.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct ApiState {
    api: String,
    plane: Arc<ControlPlane>,
}

/// Router served by one API listener.
pub(crate) fn api_router(api: String, plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .fallback(handle_api)
        .with_state(ApiState { api, plane })
}

async fn handle_api(State(state): State<ApiState>, request: Request) -> Response {
    let envelope = match envelope_from_request(request).await {
        Ok(envelope) => envelope,
        Err(response) => return response,
    };

    // Route against the current table, not a snapshot: workers registered
    // after this listener was bound are immediately routable.
    let Some(worker) = state
        .plane
        .apis
        .lookup_route(&state.api, &envelope.method, &envelope.path)
    else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!(
                "API '{}' has no route for {} {}. If the service is hot-reloading, \
                 its workers may not have re-registered yet.",
                state.api, envelope.method, envelope.path
            ),
        );
    };

    dispatch_http(worker.channel.as_ref(), envelope).await
}

#[derive(Clone)]
struct ProxyState {
    host: String,
    plane: Arc<ControlPlane>,
}

/// Router served by one HTTP-proxy listener.
pub(crate) fn proxy_router(host: String, plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .fallback(handle_proxy)
        .with_state(ProxyState { host, plane })
}

async fn handle_proxy(State(state): State<ProxyState>, request: Request) -> Response {
    let envelope = match envelope_from_request(request).await {
        Ok(envelope) => envelope,
        Err(response) => return response,
    };

    // Proxy passthrough: the whole raw request goes to the worker, no route
    // matching.
    let Some(worker) = state.plane.http.proxy_for(&state.host) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!(
                "no proxy worker is registered for host '{}'. If the service is \
                 hot-reloading, it may not have re-registered yet.",
                state.host
            ),
        );
    };

    dispatch_http(worker.channel.as_ref(), envelope).await
}

/// Dispatch an HTTP envelope to a worker and convert the result.
pub(crate) async fn dispatch_http(channel: &dyn WorkerChannel, envelope: HttpRequest) -> Response {
    let request = TriggerRequest {
        trigger: Some(trigger_request::Trigger::Http(envelope)),
    };
    match channel.dispatch(request).await {
        Ok(response) => match response.result {
            Some(trigger_response::Result::Http(envelope)) => response_from_envelope(envelope),
            other => {
                warn!("worker answered an HTTP trigger with {:?}", other);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "worker returned a non-HTTP response".to_string(),
                )
            }
        },
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("worker dispatch failed: {}", e),
        ),
    }
}

/// Translate an inbound request into the internal envelope.
pub(crate) async fn envelope_from_request(request: Request) -> Result<HttpRequest, Response> {
    let (parts, body) = request.into_parts();

    let method = parts.method.as_str().to_ascii_uppercase();
    let path = parts.uri.path().to_string();
    let query = parse_query(parts.uri.query().unwrap_or(""));

    let mut headers: HashMap<String, ValueList> = HashMap::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else { continue };
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .values
            .push(value.to_string());
    }

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("failed to read request body: {}", e),
            )
        })?;

    Ok(HttpRequest {
        method,
        path,
        headers,
        query,
        body: body.to_vec(),
    })
}

/// Copy a worker's response envelope onto an HTTP response.
pub(crate) fn response_from_envelope(envelope: HttpResponse) -> Response {
    let status =
        StatusCode::from_u16(envelope.status as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (name, values) in &envelope.headers {
        for value in &values.values {
            let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) else {
                warn!(header = %name, "dropping invalid response header");
                continue;
            };
            builder = builder.header(name, value);
        }
    }

    builder
        .body(Body::from(envelope.body))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to build response: {}", e),
            )
        })
}

fn parse_query(query: &str) -> HashMap<String, ValueList> {
    let mut params: HashMap<String, ValueList> = HashMap::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        params.entry(key).or_default().values.push(value);
    }
    params
}

pub(crate) fn error_response(status: StatusCode, message: String) -> Response {
    (status, message).into_response()
}
