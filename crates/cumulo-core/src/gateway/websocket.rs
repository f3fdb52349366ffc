// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket serving for socket listeners.
//!
//! Upgrade flow: a GET upgrade request synthesizes a `connect` event for the
//! registered connect handler; a rejection fails the upgrade with an error
//! status, an acceptance completes it, registers the live connection under a
//! fresh connection id, and enters a read loop converting each client frame
//! into a `message` event. Read error or client close dispatches
//! `disconnect` and deregisters. Each live connection runs on its own task;
//! no locks are held beyond the registration map's own.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use cumulo_protocol::messages::{
    TriggerRequest, WebsocketEvent, WebsocketEventType, trigger_request, trigger_response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::plane::ControlPlane;
use crate::workers::websockets::WebsocketTable;

#[derive(Clone)]
struct SocketState {
    socket: String,
    plane: Arc<ControlPlane>,
}

/// Router served by one websocket listener.
pub(crate) fn socket_router(socket: String, plane: Arc<ControlPlane>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(SocketState { socket, plane })
}

/// Build the event envelope for one websocket lifecycle event.
pub(crate) fn websocket_event(
    socket: &str,
    connection_id: &str,
    event_type: WebsocketEventType,
    payload: Vec<u8>,
) -> TriggerRequest {
    TriggerRequest {
        trigger: Some(trigger_request::Trigger::Websocket(WebsocketEvent {
            socket: socket.to_string(),
            connection_id: connection_id.to_string(),
            event_type: event_type as i32,
            payload,
        })),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SocketState>) -> Response {
    let connection_id = Uuid::new_v4().to_string();

    let Some(connect_handler) = state
        .plane
        .websockets
        .handler_for(&state.socket, WebsocketEventType::Connect)
    else {
        return (
            StatusCode::NOT_FOUND,
            format!(
                "socket '{}' has no connect handler registered. If the service is \
                 hot-reloading, it may not have re-registered yet.",
                state.socket
            ),
        )
            .into_response();
    };

    // The connect handler decides whether the upgrade happens at all.
    let event = websocket_event(
        &state.socket,
        &connection_id,
        WebsocketEventType::Connect,
        Vec::new(),
    );
    match connect_handler.channel.dispatch(event).await {
        Ok(response) => match response.result {
            Some(trigger_response::Result::Websocket(verdict)) if verdict.accept => {}
            Some(trigger_response::Result::Websocket(verdict)) => {
                return (
                    StatusCode::FORBIDDEN,
                    format!("connection rejected: {}", verdict.reason),
                )
                    .into_response();
            }
            other => {
                warn!("connect handler answered with {:?}", other);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "connect handler returned an unexpected response".to_string(),
                )
                    .into_response();
            }
        },
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("connect dispatch failed: {}", e),
            )
                .into_response();
        }
    }

    ws.on_upgrade(move |client| run_connection(client, state, connection_id))
}

/// Per-connection read loop; one independent task per live connection.
async fn run_connection(mut client: WebSocket, state: SocketState, connection_id: String) {
    state
        .plane
        .websockets
        .register_connection(&state.socket, &connection_id);

    while let Some(frame) = client.recv().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the transport layer.
            Ok(_) => continue,
            Err(e) => {
                debug!(socket = %state.socket, connection = %connection_id, "read error: {}", e);
                break;
            }
        };
        deliver_event(
            &state.plane.websockets,
            &state.socket,
            &connection_id,
            WebsocketEventType::Message,
            payload,
        )
        .await;
    }

    deliver_event(
        &state.plane.websockets,
        &state.socket,
        &connection_id,
        WebsocketEventType::Disconnect,
        Vec::new(),
    )
    .await;
    state
        .plane
        .websockets
        .deregister_connection(&state.socket, &connection_id);
}

/// Dispatch a message/disconnect event to its registered handler, if any.
pub(crate) async fn deliver_event(
    websockets: &WebsocketTable,
    socket: &str,
    connection_id: &str,
    event_type: WebsocketEventType,
    payload: Vec<u8>,
) {
    let Some(handler) = websockets.handler_for(socket, event_type) else {
        debug!(socket, ?event_type, "no handler registered for event");
        return;
    };
    let event = websocket_event(socket, connection_id, event_type, payload);
    if let Err(e) = handler.channel.dispatch(event).await {
        warn!(socket, ?event_type, "websocket event dispatch failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::MockChannel;
    use crate::workers::Worker;
    use cumulo_protocol::messages::WebsocketSpec;

    fn table_with_handler(
        socket: &str,
        event_type: WebsocketEventType,
        channel: Arc<MockChannel>,
    ) -> WebsocketTable {
        // Direct registration: these tests drive the event path, not the
        // registration stream.
        let table = WebsocketTable::new();
        table.register_for_test(Worker::new(
            "chat-service",
            WebsocketSpec {
                socket: socket.to_string(),
                event_type: event_type as i32,
            },
            channel,
        ));
        table
    }

    #[tokio::test]
    async fn test_deliver_event_reaches_registered_handler() {
        let channel = Arc::new(MockChannel::websocket(true, ""));
        let table = table_with_handler("chat", WebsocketEventType::Message, channel.clone());

        deliver_event(
            &table,
            "chat",
            "conn-1",
            WebsocketEventType::Message,
            b"hello".to_vec(),
        )
        .await;

        assert_eq!(channel.received_count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_event_without_handler_is_a_noop() {
        let table = WebsocketTable::new();
        deliver_event(
            &table,
            "chat",
            "conn-1",
            WebsocketEventType::Disconnect,
            Vec::new(),
        )
        .await;
    }

    #[test]
    fn test_websocket_event_envelope_shape() {
        let event = websocket_event("chat", "conn-1", WebsocketEventType::Connect, Vec::new());
        match event.trigger {
            Some(trigger_request::Trigger::Websocket(ws)) => {
                assert_eq!(ws.socket, "chat");
                assert_eq!(ws.connection_id, "conn-1");
                assert_eq!(ws.event_type, WebsocketEventType::Connect as i32);
            }
            other => panic!("unexpected trigger: {:?}", other),
        }
    }
}
