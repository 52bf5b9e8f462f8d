//! Utility functions and helpers for configuration

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serde helper module for Duration serialization as seconds
pub mod serde_duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

/// Serde helper module for Duration serialization as milliseconds
pub mod serde_duration_millis {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Default functions for serde
pub fn default_true() -> bool {
    true
}

pub fn default_false() -> bool {
    false
}

/// Parse a duration given in whole seconds, as used by environment overrides
pub fn parse_secs(value: &str) -> Result<Duration, std::num::ParseIntError> {
    value.trim().parse::<u64>().map(Duration::from_secs)
}

/// Parse a duration given in milliseconds
pub fn parse_millis(value: &str) -> Result<Duration, std::num::ParseIntError> {
    value.trim().parse::<u64>().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "serde_duration_millis")]
        poll: Duration,
        #[serde(with = "serde_duration")]
        ttl: Duration,
    }

    #[test]
    fn test_duration_units() {
        let parsed: Holder = serde_yaml::from_str("poll: 250\nttl: 30\n").unwrap();
        assert_eq!(parsed.poll, Duration::from_millis(250));
        assert_eq!(parsed.ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_secs(" 5 ").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_millis("750").unwrap(), Duration::from_millis(750));
        assert!(parse_secs("soon").is_err());
    }
}
