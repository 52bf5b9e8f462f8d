//! Configuration loading and environment variable handling

use crate::domains::utils::{parse_millis, parse_secs};
use crate::domains::LecternConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "LECTERN".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<LecternConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: LecternConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<LecternConfig> {
        let mut config = LecternConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<LecternConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut LecternConfig) -> ConfigResult<()> {
        self.apply_server_overrides(&mut config.server)?;
        self.apply_execution_overrides(&mut config.execution)?;
        self.apply_progress_overrides(&mut config.progress)?;
        self.apply_storage_overrides(&mut config.storage);
        self.apply_retention_overrides(&mut config.retention)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_server_overrides(
        &self,
        config: &mut crate::domains::server::ServerConfig,
    ) -> ConfigResult<()> {
        if let Ok(bind) = self.get_env_var("SERVER_BIND_ADDRESS") {
            config.bind_address = bind;
        }

        if let Ok(port) = self.get_env_var("SERVER_PORT") {
            config.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SERVER_PORT: {}", e)))?;
        }

        if let Ok(prefix) = self.get_env_var("SERVER_API_PREFIX") {
            config.api_prefix = prefix;
        }

        if let Ok(origins) = self.get_env_var("CORS_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(())
    }

    fn apply_execution_overrides(
        &self,
        config: &mut crate::domains::execution::ExecutionConfig,
    ) -> ConfigResult<()> {
        if let Ok(program) = self.get_env_var("WORKER_PROGRAM") {
            config.worker_program = Some(program.into());
        }

        if let Ok(grace) = self.get_env_var("GRACE_PERIOD_SECONDS") {
            config.grace_period = parse_secs(&grace).map_err(|e| {
                ConfigError::EnvError(format!("Invalid GRACE_PERIOD_SECONDS: {}", e))
            })?;
        }

        if let Ok(confirm) = self.get_env_var("KILL_CONFIRM_SECONDS") {
            config.kill_confirm_timeout = parse_secs(&confirm).map_err(|e| {
                ConfigError::EnvError(format!("Invalid KILL_CONFIRM_SECONDS: {}", e))
            })?;
        }

        if let Ok(fail) = self.get_env_var("FAIL_ON_WORKER_EXIT") {
            config.fail_on_worker_exit = fail.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid FAIL_ON_WORKER_EXIT: {}", e))
            })?;
        }

        Ok(())
    }

    fn apply_progress_overrides(
        &self,
        config: &mut crate::domains::progress::ProgressConfig,
    ) -> ConfigResult<()> {
        if let Ok(poll) = self.get_env_var("STREAM_POLL_INTERVAL_MS") {
            config.stream_poll_interval = parse_millis(&poll).map_err(|e| {
                ConfigError::EnvError(format!("Invalid STREAM_POLL_INTERVAL_MS: {}", e))
            })?;
        }

        if let Ok(throttle) = self.get_env_var("WEBHOOK_THROTTLE_MS") {
            config.webhook_throttle = parse_millis(&throttle).map_err(|e| {
                ConfigError::EnvError(format!("Invalid WEBHOOK_THROTTLE_MS: {}", e))
            })?;
        }

        if let Ok(timeout) = self.get_env_var("WEBHOOK_TIMEOUT") {
            config.webhook_timeout = parse_secs(&timeout)
                .map_err(|e| ConfigError::EnvError(format!("Invalid WEBHOOK_TIMEOUT: {}", e)))?;
        }

        Ok(())
    }

    fn apply_storage_overrides(&self, config: &mut crate::domains::storage::StorageConfig) {
        if let Ok(dir) = self.get_env_var("UPLOAD_DIR") {
            config.upload_dir = dir.into();
        }
    }

    fn apply_retention_overrides(
        &self,
        config: &mut crate::domains::retention::RetentionConfig,
    ) -> ConfigResult<()> {
        if let Ok(ttl) = self.get_env_var("JOB_TTL_SECONDS") {
            config.terminal_ttl = parse_secs(&ttl)
                .map_err(|e| ConfigError::EnvError(format!("Invalid JOB_TTL_SECONDS: {}", e)))?;
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
