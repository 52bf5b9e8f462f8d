//! Finished job retention

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How long a terminal job stays queryable
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_terminal_ttl")]
    pub terminal_ttl: Duration,

    /// How often the sweeper runs
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            terminal_ttl: default_terminal_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Validatable for RetentionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.terminal_ttl.as_secs(), "terminal_ttl", self.domain_name())?;
        validate_positive(self.sweep_interval.as_secs(), "sweep_interval", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "retention"
    }
}

fn default_terminal_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}
