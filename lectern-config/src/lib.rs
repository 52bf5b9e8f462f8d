//! Domain-driven configuration management for Lectern
//!
//! Configuration is split by functional domain (server, execution, progress,
//! storage, retention, logging). Each domain carries serde defaults, can be
//! overridden through `LECTERN_*` environment variables and validates itself
//! through [`validation::Validatable`].

pub mod error;
pub mod loader;
pub mod validation;

pub mod domains;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    execution::ExecutionConfig, logging::LoggingConfig, progress::ProgressConfig,
    retention::RetentionConfig, server::ServerConfig, storage::StorageConfig, LecternConfig,
};

pub use domains::utils::{serde_duration, serde_duration_millis};
