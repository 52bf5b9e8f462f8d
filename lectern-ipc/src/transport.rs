//! IPC transport implementations
//!
//! Reading and writing are separate halves so the supervisor and the worker
//! can drive each direction from its own task. The reader keeps one
//! `BufReader` for its whole life; bytes buffered past a newline belong to
//! the next message.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, IPC_PROTOCOL_VERSION};

/// IPC transport trait for different communication mechanisms
#[async_trait]
pub trait IpcTransport: Send {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError>;

    /// Receive a message from the other end
    async fn receive<T: DeserializeOwned + Send>(&mut self) -> Result<MessageEnvelope<T>, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Receiving half: newline-delimited envelopes
pub struct IpcReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin + Send> IpcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: String::new(),
        }
    }

    /// Read the next envelope. EOF yields [`IpcError::ConnectionClosed`].
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<MessageEnvelope<T>, IpcError> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                return Err(IpcError::ConnectionClosed);
            }

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let envelope: MessageEnvelope<T> = serde_json::from_str(trimmed)
                .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

            // Check protocol version compatibility
            if envelope.protocol_version != IPC_PROTOCOL_VERSION {
                return Err(IpcError::ProtocolVersionMismatch {
                    expected: IPC_PROTOCOL_VERSION,
                    actual: envelope.protocol_version,
                });
            }

            return Ok(envelope);
        }
    }
}

/// Sending half
pub struct IpcWriter<W> {
    writer: Option<W>,
}

impl<W: AsyncWrite + Unpin + Send> IpcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Some(inner),
        }
    }

    pub async fn send<T: Serialize>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        let writer = self.writer.as_mut().ok_or(IpcError::NotConnected)?;

        let mut json = serde_json::to_string(message)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;
        // Send with newline delimiter
        json.push('\n');

        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Wrap `message` in an envelope and send it
    pub async fn send_message<T: Serialize>(&mut self, message: T) -> Result<(), IpcError> {
        self.send(&MessageEnvelope::new(message)).await
    }

    /// Flush and drop the underlying stream, signalling EOF to the peer
    pub async fn close(&mut self) -> Result<(), IpcError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

/// A reader and a writer used as one bidirectional link
pub struct Transport<R, W> {
    reader: IpcReader<R>,
    writer: IpcWriter<W>,
}

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: IpcReader::new(reader),
            writer: IpcWriter::new(writer),
        }
    }

    /// Separate the halves so each direction can live on its own task
    pub fn into_split(self) -> (IpcReader<R>, IpcWriter<W>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl<R, W> IpcTransport for Transport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        self.writer.send(message).await
    }

    async fn receive<T: DeserializeOwned + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        self.reader.receive().await
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        self.writer.close().await
    }
}

/// Supervisor side: read the child's stdout, write its stdin
pub type ChildProcessTransport = Transport<tokio::process::ChildStdout, tokio::process::ChildStdin>;

impl ChildProcessTransport {
    pub fn from_child(
        stdin: tokio::process::ChildStdin,
        stdout: tokio::process::ChildStdout,
    ) -> Self {
        Transport::new(stdout, stdin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CoordinatorMessage, WorkerMessage};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_back_to_back_messages_survive_buffering() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, client_write) = tokio::io::split(client);

        let mut writer = IpcWriter::new(client_write);
        for n in 0..3u32 {
            writer
                .send_message(CoordinatorMessage::Ready {
                    worker_id: format!("w{n}"),
                    pid: n,
                })
                .await
                .unwrap();
        }
        writer.close().await.unwrap();

        let mut reader = IpcReader::new(server_read);
        for n in 0..3u32 {
            let envelope = reader.receive::<CoordinatorMessage>().await.unwrap();
            match envelope.message {
                CoordinatorMessage::Ready { pid, .. } => assert_eq!(pid, n),
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert!(matches!(
            reader.receive::<CoordinatorMessage>().await,
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_version_mismatch_and_garbage() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, _w) = tokio::io::split(server);
        let (_r, mut client_write) = tokio::io::split(client);

        let input = concat!(
            "\n",
            r#"{"protocol_version":99,"timestamp":"2024-01-01T00:00:00Z","#,
            r#""message":{"type":"shutdown"}}"#,
            "\nnot json\n",
        );
        client_write.write_all(input.as_bytes()).await.unwrap();

        let mut reader = IpcReader::new(server_read);
        assert!(matches!(
            reader.receive::<WorkerMessage>().await,
            Err(IpcError::ProtocolVersionMismatch { expected: 1, actual: 99 })
        ));
        assert!(matches!(
            reader.receive::<WorkerMessage>().await,
            Err(IpcError::DeserializationError(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_round_trip() {
        let (a, b) = tokio::io::duplex(4096);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let mut left = Transport::new(a_read, a_write);
        let mut right = Transport::new(b_read, b_write);

        left.send(&MessageEnvelope::new(WorkerMessage::Shutdown))
            .await
            .unwrap();
        let received: MessageEnvelope<WorkerMessage> = right.receive().await.unwrap();
        assert!(matches!(received.message, WorkerMessage::Shutdown));

        left.close().await.unwrap();
        let err = right.receive::<WorkerMessage>().await.unwrap_err();
        assert!(matches!(err, IpcError::ConnectionClosed));
    }
}
