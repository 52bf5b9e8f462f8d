//! IPC error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Failed to encode message: {0}")]
    SerializationError(String),

    /// A line that is not a valid envelope. The stream stays usable.
    #[error("Malformed message: {0}")]
    DeserializationError(String),

    #[error("Pipe error: {0}")]
    IoError(String),

    /// The peer closed its end of the pipe
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u32, actual: u32 },

    /// The writer was already closed locally
    #[error("Transport not connected")]
    NotConnected,
}

impl IpcError {
    /// Whether the stream can keep being read after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IpcError::DeserializationError(_))
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
                IpcError::ConnectionClosed
            }
            _ => IpcError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::IoError(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::DeserializationError(err.to_string())
        } else {
            IpcError::SerializationError(err.to_string())
        }
    }
}
