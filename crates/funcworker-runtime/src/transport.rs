//! Message transport between host and worker.
//!
//! The dispatcher reads through a [`MessageSource`] and writes through a
//! [`MessageSink`]. Two implementations are provided: in-memory channels
//! ([`channel_transport`]) and newline-delimited JSON over any async byte
//! stream ([`JsonLinesSource`], [`JsonLinesSink`]).

use async_trait::async_trait;
use funcworker_core::{StreamingMessage, WorkerError, WorkerResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{Mutex, mpsc};

/// Inbound half of the protocol stream.
#[async_trait]
pub trait MessageSource: Send {
    /// Read the next message. `Ok(None)` means the stream closed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Transport`] on I/O or decode failure. Such
    /// errors end the dispatch loop.
    async fn next_message(&mut self) -> WorkerResult<Option<StreamingMessage>>;
}

/// Outbound half of the protocol stream. Shared by concurrent handlers.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Write one message.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Transport`] if the message cannot be written.
    async fn send(&self, message: StreamingMessage) -> WorkerResult<()>;
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Host side of an in-memory transport.
#[derive(Debug)]
pub struct HostEndpoint {
    /// Messages to the worker. Drop it to close the worker's inbound stream.
    pub requests: mpsc::Sender<StreamingMessage>,
    /// Messages from the worker.
    pub responses: mpsc::Receiver<StreamingMessage>,
}

/// Worker-side inbound channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<StreamingMessage>,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> WorkerResult<Option<StreamingMessage>> {
        Ok(self.rx.recv().await)
    }
}

/// Worker-side outbound channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamingMessage>,
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, message: StreamingMessage) -> WorkerResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| WorkerError::Transport("host endpoint closed".into()))
    }
}

/// Create a connected in-memory transport with `buffer` slots per direction.
#[must_use]
pub fn channel_transport(buffer: usize) -> (HostEndpoint, ChannelSource, ChannelSink) {
    let (request_tx, request_rx) = mpsc::channel(buffer.max(1));
    let (response_tx, response_rx) = mpsc::channel(buffer.max(1));
    (
        HostEndpoint {
            requests: request_tx,
            responses: response_rx,
        },
        ChannelSource { rx: request_rx },
        ChannelSink { tx: response_tx },
    )
}

// ---------------------------------------------------------------------------
// JSON lines
// ---------------------------------------------------------------------------

/// Reads one JSON message per line.
///
/// Blank lines are skipped. A line that is not a valid message is an
/// unrecoverable stream error. Unknown payload kinds are not an error here;
/// they decode to [`funcworker_core::Content::Unrecognized`].
pub struct JsonLinesSource<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> JsonLinesSource<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageSource for JsonLinesSource<R> {
    async fn next_message(&mut self) -> WorkerResult<Option<StreamingMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line)
                .map_err(|e| WorkerError::Transport(format!("malformed message line: {e}")))?;
            return StreamingMessage::from_json(value).map(Some);
        }
        Ok(None)
    }
}

/// Writes one JSON message per line and flushes after each.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageSink for JsonLinesSink<W> {
    async fn send(&self, message: StreamingMessage) -> WorkerResult<()> {
        let mut line = serde_json::to_vec(&message)
            .map_err(|e| WorkerError::Transport(format!("cannot encode message: {e}")))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
