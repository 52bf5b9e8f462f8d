//! Core error types for Lectern

use thiserror::Error;

use crate::job::JobId;

/// Registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
