// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trigger dispatch to registered workers.
//!
//! Every registered worker carries a [`WorkerChannel`]; the production
//! implementation opens a server-initiated bidirectional QUIC stream on the
//! worker's connection and runs one unary trigger exchange. Tables and the
//! gateway only see the trait, which keeps them testable without a network.

use anyhow::{Result, bail};
use async_trait::async_trait;
use cumulo_protocol::frame::{Frame, read_frame, write_frame};
use cumulo_protocol::messages::{
    RpcError, TriggerRequest, TriggerResponse, trigger_response,
};
use tracing::debug;

/// A path for delivering one trigger to one worker.
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    /// Dispatch a trigger and wait for the worker's response.
    async fn dispatch(&self, request: TriggerRequest) -> Result<TriggerResponse>;
}

/// Dispatches triggers over server-initiated QUIC streams.
pub struct QuicWorkerChannel {
    connection: quinn::Connection,
}

impl QuicWorkerChannel {
    /// Wrap a worker's connection.
    pub fn new(connection: quinn::Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl WorkerChannel for QuicWorkerChannel {
    async fn dispatch(&self, request: TriggerRequest) -> Result<TriggerResponse> {
        let (mut send, mut recv) = self.connection.open_bi().await?;

        let frame = Frame::request(&request)?;
        write_frame(&mut send, &frame).await?;
        send.finish()?;

        let response_frame = read_frame(&mut recv).await?;
        if response_frame.is_error() {
            let err: RpcError = response_frame.decode()?;
            bail!("worker returned error {}: {}", err.code, err.message);
        }
        let response: TriggerResponse = response_frame.decode()?;
        debug!("trigger dispatched");
        Ok(response)
    }
}

/// Dispatch a trigger whose response must be a successful ack.
pub async fn expect_ack(channel: &dyn WorkerChannel, request: TriggerRequest) -> Result<()> {
    match channel.dispatch(request).await?.result {
        Some(trigger_response::Result::Ack(ack)) => {
            if ack.success {
                Ok(())
            } else {
                bail!("worker rejected trigger: {}", ack.error)
            }
        }
        other => bail!("worker returned unexpected trigger response: {:?}", other),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock channel used by table and gateway unit tests.

    use std::sync::Mutex;

    use super::*;
    use cumulo_protocol::messages::{HttpResponse, TriggerAck, WebsocketEventResponse};

    /// Records every dispatched trigger and answers with a canned response.
    pub struct MockChannel {
        response: Box<dyn Fn() -> TriggerResponse + Send + Sync>,
        pub received: Mutex<Vec<TriggerRequest>>,
    }

    impl MockChannel {
        pub fn with_response<F>(response: F) -> Self
        where
            F: Fn() -> TriggerResponse + Send + Sync + 'static,
        {
            Self {
                response: Box::new(response),
                received: Mutex::new(Vec::new()),
            }
        }

        /// Always acknowledges successfully.
        pub fn ack() -> Self {
            Self::with_response(|| TriggerResponse {
                result: Some(trigger_response::Result::Ack(TriggerAck {
                    success: true,
                    error: String::new(),
                })),
            })
        }

        /// Always answers an HTTP response with the given status and body.
        pub fn http(status: u32, body: &'static str) -> Self {
            Self::with_response(move || TriggerResponse {
                result: Some(trigger_response::Result::Http(HttpResponse {
                    status,
                    headers: Default::default(),
                    body: body.as_bytes().to_vec(),
                })),
            })
        }

        /// Always answers a websocket verdict.
        pub fn websocket(accept: bool, reason: &'static str) -> Self {
            Self::with_response(move || TriggerResponse {
                result: Some(trigger_response::Result::Websocket(
                    WebsocketEventResponse {
                        accept,
                        reason: reason.to_string(),
                    },
                )),
            })
        }

        pub fn received_count(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WorkerChannel for MockChannel {
        async fn dispatch(&self, request: TriggerRequest) -> Result<TriggerResponse> {
            self.received.lock().unwrap().push(request);
            Ok((self.response)())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockChannel;
    use super::*;
    use cumulo_protocol::messages::{ScheduleTrigger, TriggerAck, trigger_request};

    fn schedule_trigger() -> TriggerRequest {
        TriggerRequest {
            trigger: Some(trigger_request::Trigger::Schedule(ScheduleTrigger {
                schedule: "daily".to_string(),
            })),
        }
    }

    #[tokio::test]
    async fn test_expect_ack_accepts_successful_ack() {
        let channel = MockChannel::ack();
        expect_ack(&channel, schedule_trigger()).await.unwrap();
        assert_eq!(channel.received_count(), 1);
    }

    #[tokio::test]
    async fn test_expect_ack_rejects_failed_ack() {
        let channel = MockChannel::with_response(|| TriggerResponse {
            result: Some(trigger_response::Result::Ack(TriggerAck {
                success: false,
                error: "handler crashed".to_string(),
            })),
        });
        let err = expect_ack(&channel, schedule_trigger()).await.unwrap_err();
        assert!(err.to_string().contains("handler crashed"));
    }

    #[tokio::test]
    async fn test_expect_ack_rejects_wrong_response_kind() {
        let channel = MockChannel::http(200, "ok");
        assert!(expect_ack(&channel, schedule_trigger()).await.is_err());
    }
}
