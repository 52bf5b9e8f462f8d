//! Configuration error types

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `LECTERN_*` variable held a value of the wrong shape
    #[error("Environment variable error: {0}")]
    EnvError(String),

    /// A domain rejected its own values during validation
    #[error("Invalid {domain} configuration: {message}")]
    DomainError { domain: String, message: String },
}

impl ConfigError {
    pub fn domain(domain: &str, message: impl Into<String>) -> Self {
        ConfigError::DomainError {
            domain: domain.to_string(),
            message: message.into(),
        }
    }
}
