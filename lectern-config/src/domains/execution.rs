//! Worker process supervision configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Worker execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Program started for each job. Defaults to the running executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,

    /// Extra arguments placed before `--worker`
    #[serde(default)]
    pub worker_args: Vec<String>,

    /// Time a worker gets to exit after a cooperative stop request
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_grace_period")]
    pub grace_period: Duration,

    /// Time allowed for the OS to confirm a forced kill
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_kill_confirm_timeout"
    )]
    pub kill_confirm_timeout: Duration,

    /// Record `failed` when a worker exits without writing a terminal status
    #[serde(default = "crate::domains::utils::default_false")]
    pub fail_on_worker_exit: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_program: None,
            worker_args: Vec::new(),
            grace_period: default_grace_period(),
            kill_confirm_timeout: default_kill_confirm_timeout(),
            fail_on_worker_exit: false,
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.grace_period.as_millis(),
            "grace_period",
            self.domain_name(),
        )?;
        validate_positive(
            self.kill_confirm_timeout.as_millis(),
            "kill_confirm_timeout",
            self.domain_name(),
        )?;

        if let Some(program) = &self.worker_program {
            if program.as_os_str().is_empty() {
                return Err(self.validation_error("worker_program cannot be empty"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

fn default_grace_period() -> Duration {
    Duration::from_secs(2)
}

fn default_kill_confirm_timeout() -> Duration {
    Duration::from_secs(1)
}
