//! Duplex message connections.
//!
//! The orchestrator reads one handshake message and then only writes. All
//! writers share one lock, held for exactly one message at a time.

use super::protocol::ServerMessage;
use crate::error::ConnectionError;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Longest inbound line accepted, newline excluded.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// A persistent, message-oriented, bidirectional channel to one client.
#[async_trait]
pub trait MessageConnection: Send + 'static {
    /// Read the next text message; `None` once the peer has closed.
    async fn recv_text(&mut self) -> Result<Option<String>, ConnectionError>;

    /// Write one text message.
    async fn send_text(&mut self, text: &str) -> Result<(), ConnectionError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Newline-delimited JSON over any byte stream.
///
/// Inbound lines longer than [`MAX_MESSAGE_LEN`] are refused with
/// [`ConnectionError::LineTooLong`] instead of being buffered.
pub struct LineConnection<S> {
    reader: FramedRead<ReadHalf<S>, LinesCodec>,
    writer: WriteHalf<S>,
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_LEN)),
            writer,
        }
    }
}

#[async_trait]
impl<S> MessageConnection for LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn recv_text(&mut self) -> Result<Option<String>, ConnectionError> {
        while let Some(line) = self.reader.next().await {
            let line = line.map_err(|e| match e {
                LinesCodecError::MaxLineLengthExceeded => ConnectionError::LineTooLong(MAX_MESSAGE_LEN),
                LinesCodecError::Io(e) => ConnectionError::Io(e),
            })?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
        Ok(None)
    }

    async fn send_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// A connection shared by every worker of a session.
pub struct SharedConnection<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for SharedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: MessageConnection> SharedConnection<C> {
    pub fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Read the next inbound message.
    pub async fn recv_text(&self) -> Result<Option<String>, ConnectionError> {
        self.inner.lock().await.recv_text().await
    }

    /// Encode `message` and write it under the write lock.
    pub async fn send(&self, message: &ServerMessage) -> Result<(), ConnectionError> {
        let text = message.to_json()?;
        self.inner.lock().await.send_text(&text).await
    }

    /// Write a final message and close, under one hold of the lock.
    pub async fn send_and_close(&self, message: &ServerMessage) -> Result<(), ConnectionError> {
        let text = message.to_json()?;
        let mut connection = self.inner.lock().await;
        let sent = connection.send_text(&text).await;
        let closed = connection.close().await;
        sent.and(closed)
    }
}
