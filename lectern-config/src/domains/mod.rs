//! Domain-specific configuration modules

pub mod execution;
pub mod logging;
pub mod progress;
pub mod retention;
pub mod server;
pub mod storage;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Lectern configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LecternConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: server::ServerConfig,

    /// Worker process supervision
    #[serde(default)]
    pub execution: execution::ExecutionConfig,

    /// Progress streaming and webhook delivery
    #[serde(default)]
    pub progress: progress::ProgressConfig,

    /// Upload directory and accepted inputs
    #[serde(default)]
    pub storage: storage::StorageConfig,

    /// Finished job retention
    #[serde(default)]
    pub retention: retention::RetentionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl LecternConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.execution.validate()?;
        self.progress.validate()?;
        self.storage.validate()?;
        self.retention.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = LecternConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
