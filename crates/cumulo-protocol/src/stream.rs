// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stream adapters used by the registration protocol.
//!
//! [`PeekableStream`] lets a registration handler inspect the first frame of
//! a worker stream, to validate it and extract routing metadata, and then
//! hand the stream onward with that frame still unread from the downstream
//! consumer's point of view. [`BiStream`] glues a QUIC bidirectional stream
//! pair into a single duplex object the framed codec can drive.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use quinn::{RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::frame::{Frame, FrameError, FramedStream};

/// A QUIC bidirectional stream as one duplex reader/writer.
pub struct BiStream {
    send: SendStream,
    recv: RecvStream,
}

impl BiStream {
    /// Pair a QUIC send/recv stream into a duplex stream.
    pub fn new(send: SendStream, recv: RecvStream) -> Self {
        Self { send, recv }
    }

    /// Finish the send side (signal no more data).
    pub fn finish(&mut self) -> Result<(), quinn::ClosedStream> {
        self.send.finish()
    }
}

impl AsyncRead for BiStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for BiStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.get_mut().send), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().send).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().send).poll_shutdown(cx)
    }
}

/// A framed stream whose reads can be previewed without consuming them.
///
/// `peek` performs at most one underlying read and buffers the outcome
/// (frame or error) so a later `recv` replays it verbatim before falling
/// through to the live stream. Buffered entries drain FIFO.
pub struct PeekableStream<S> {
    inner: FramedStream<S>,
    buffered: VecDeque<Result<Frame, FrameError>>,
}

impl<S> PeekableStream<S> {
    /// Wrap a raw duplex stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: FramedStream::new(stream),
            buffered: VecDeque::new(),
        }
    }

    /// Number of reads currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}

impl<S: AsyncRead + Unpin> PeekableStream<S> {
    /// Look at the next frame without consuming it.
    ///
    /// Repeated peeks without an intervening `recv` return the same
    /// buffered outcome and do not read from the underlying stream again.
    pub async fn peek(&mut self) -> &Result<Frame, FrameError> {
        if self.buffered.is_empty() {
            let next = self.inner.read_frame().await;
            self.buffered.push_back(next);
        }
        self.buffered.front().expect("peek buffer is non-empty")
    }

    /// Read the next frame, draining buffered peeks first.
    ///
    /// An error buffered by `peek` is replayed here exactly once.
    pub async fn recv(&mut self) -> Result<Frame, FrameError> {
        if let Some(buffered) = self.buffered.pop_front() {
            return buffered;
        }
        self.inner.read_frame().await
    }
}

impl<S: AsyncWrite + Unpin> PeekableStream<S> {
    /// Write a frame to the stream; unaffected by buffering.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), FrameError> {
        self.inner.write_frame(frame).await
    }

    /// Finish the send side (signal no more data). On QUIC this is a clean
    /// FIN rather than the reset an unfinished stream gets on drop.
    pub async fn finish(&mut self) -> Result<(), FrameError> {
        use tokio::io::AsyncWriteExt;
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::write_frame;
    use crate::messages::{RegistrationResponse, RpcError};

    fn frame(code: &str) -> Frame {
        Frame::request(&RpcError {
            code: code.to_string(),
            message: String::new(),
        })
        .unwrap()
    }

    fn code_of(frame: &Frame) -> String {
        frame.decode::<RpcError>().unwrap().code
    }

    #[tokio::test]
    async fn test_peek_then_recv_yields_peeked_frame_first() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        let mut stream = PeekableStream::new(reader);

        for code in ["first", "second", "third"] {
            write_frame(&mut writer, &frame(code)).await.unwrap();
        }

        let peeked = stream.peek().await.as_ref().unwrap();
        assert_eq!(code_of(peeked), "first");

        // The peeked frame comes back from recv, then the live stream.
        assert_eq!(code_of(&stream.recv().await.unwrap()), "first");
        assert_eq!(code_of(&stream.recv().await.unwrap()), "second");
        assert_eq!(code_of(&stream.recv().await.unwrap()), "third");
        assert_eq!(stream.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_repeated_peek_reads_underlying_stream_once() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        let mut stream = PeekableStream::new(reader);

        write_frame(&mut writer, &frame("only")).await.unwrap();

        for _ in 0..3 {
            let peeked = stream.peek().await.as_ref().unwrap();
            assert_eq!(code_of(peeked), "only");
        }
        assert_eq!(stream.buffered_len(), 1);
        assert_eq!(code_of(&stream.recv().await.unwrap()), "only");
    }

    #[tokio::test]
    async fn test_peeked_error_is_replayed_on_recv() {
        let (writer, reader) = tokio::io::duplex(4096);
        let mut stream = PeekableStream::new(reader);
        drop(writer); // EOF before any frame

        assert!(matches!(
            stream.peek().await,
            Err(FrameError::ConnectionClosed)
        ));
        assert!(matches!(
            stream.recv().await,
            Err(FrameError::ConnectionClosed)
        ));
        assert_eq!(stream.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_send_passes_through_while_peeking() {
        let (mut far_writer, near) = tokio::io::duplex(4096);
        let mut stream = PeekableStream::new(near);

        write_frame(&mut far_writer, &frame("incoming")).await.unwrap();
        let _ = stream.peek().await;

        let response = Frame::response(&RegistrationResponse {
            success: true,
            error: String::new(),
        })
        .unwrap();
        stream.send(&response).await.unwrap();

        // The peeked frame is still pending for the next consumer.
        assert_eq!(code_of(&stream.recv().await.unwrap()), "incoming");
    }
}
