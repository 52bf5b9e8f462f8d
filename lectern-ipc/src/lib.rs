//! Inter-process communication for Lectern
//!
//! This crate provides the IPC protocol and transport used between the
//! supervisor in the server process and each worker process. Messages are
//! newline-delimited JSON envelopes over the worker's stdin and stdout.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{
    CoordinatorMessage, MessageEnvelope, WorkerError, WorkerMessage, WorkerSettings,
    IPC_PROTOCOL_VERSION,
};
pub use transport::{ChildProcessTransport, IpcReader, IpcTransport, IpcWriter, Transport};
