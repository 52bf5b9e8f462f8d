//! Progress streaming and webhook delivery configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// How long the stream endpoint waits on the channel before re-reading the job
    #[serde(
        rename = "stream_poll_interval_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_stream_poll_interval"
    )]
    pub stream_poll_interval: Duration,

    /// Idle time after which the stream emits a `ping`
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_keepalive_interval"
    )]
    pub keepalive_interval: Duration,

    /// Minimum spacing between webhook posts within one stage
    #[serde(
        rename = "webhook_throttle_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_webhook_throttle"
    )]
    pub webhook_throttle: Duration,

    /// Per-request webhook timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_webhook_timeout"
    )]
    pub webhook_timeout: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            stream_poll_interval: default_stream_poll_interval(),
            keepalive_interval: default_keepalive_interval(),
            webhook_throttle: default_webhook_throttle(),
            webhook_timeout: default_webhook_timeout(),
        }
    }
}

impl Validatable for ProgressConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.stream_poll_interval.as_millis(),
            "stream_poll_interval_ms",
            self.domain_name(),
        )?;
        validate_positive(
            self.keepalive_interval.as_secs(),
            "keepalive_interval",
            self.domain_name(),
        )?;
        validate_positive(
            self.webhook_timeout.as_secs(),
            "webhook_timeout",
            self.domain_name(),
        )?;

        if self.keepalive_interval <= self.stream_poll_interval {
            return Err(self.validation_error(
                "keepalive_interval must be longer than stream_poll_interval_ms",
            ));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "progress"
    }
}

fn default_stream_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_webhook_throttle() -> Duration {
    Duration::from_millis(500)
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_uses_millisecond_keys() {
        let yaml = "stream_poll_interval_ms: 100\nwebhook_throttle_ms: 50\n";
        let config: ProgressConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.stream_poll_interval, Duration::from_millis(100));
        assert_eq!(config.webhook_throttle, Duration::from_millis(50));
        assert_eq!(config.keepalive_interval, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_keepalive_shorter_than_poll_rejected() {
        let config = ProgressConfig {
            stream_poll_interval: Duration::from_secs(20),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
