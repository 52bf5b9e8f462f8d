//! Error types for job execution

use lectern_core::{JobId, RegistryError};
use lectern_ipc::IpcError;
use thiserror::Error;

/// Supervisor errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("A worker is already running for job {0}")]
    AlreadyRunning(JobId),

    #[error("Failed to spawn worker process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Worker for job {0} could not be confirmed dead")]
    TerminationUnconfirmed(JobId),
}

/// Errors a converter reports back to the entry point.
///
/// The display form is what ends up in the job's `error` field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("File not found")]
    InputNotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to fetch input: {0}")]
    Fetch(String),

    #[error("Conversion failed: {0}")]
    Failed(String),
}

impl From<std::io::Error> for ConversionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ConversionError::InputNotFound,
            std::io::ErrorKind::InvalidData => ConversionError::InvalidInput(err.to_string()),
            _ => ConversionError::Fetch(err.to_string()),
        }
    }
}

/// Worker runtime errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to build webhook client: {0}")]
    WebhookClient(#[from] reqwest::Error),
}
