//! IPC protocol definitions and message types

use chrono::{DateTime, Utc};
use lectern_core::{ConversionJob, JobId, JobUpdate, ProgressEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Messages sent from the supervisor to a worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Run one conversion; a worker handles exactly one
    RunConversion {
        job: ConversionJob,
        #[serde(default)]
        settings: WorkerSettings,
    },

    /// Stop cooperatively
    Shutdown,
}

/// Runtime knobs the supervisor hands to each worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Minimum spacing between webhook posts within a stage
    pub webhook_throttle_ms: u64,
    /// Per-request webhook timeout
    pub webhook_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            webhook_throttle_ms: 500,
            webhook_timeout_ms: 5_000,
        }
    }
}

/// Messages sent from a worker process to the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorMessage {
    /// Worker initialised and waiting for its job
    Ready { worker_id: String, pid: u32 },

    /// Status write for the job, stamped with the worker's epoch
    StatusUpdate {
        job_id: JobId,
        epoch: u64,
        update: JobUpdate,
    },

    /// Progress observation in shared-channel mode
    Progress { job_id: JobId, event: ProgressEvent },

    /// Worker-level failure outside the conversion itself
    Error {
        job_id: Option<JobId>,
        error: WorkerError,
    },
}

/// Problems a worker reports without failing the job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum WorkerError {
    /// A line from the supervisor could not be decoded
    MessageParseError { error: String },

    /// A second job arrived while one was running
    JobRejected { error: String },

    /// Webhook delivery could not be set up; progress is dropped
    WebhookUnavailable { error: String },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::MessageParseError { error } => write!(f, "Message parse error: {}", error),
            WorkerError::JobRejected { error } => write!(f, "Job rejected: {}", error),
            WorkerError::WebhookUnavailable { error } => {
                write!(f, "Webhook unavailable: {}", error)
            }
        }
    }
}

impl std::error::Error for WorkerError {}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}
