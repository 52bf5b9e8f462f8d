//! Per-domain validation and the field checks the domains share

use crate::error::{ConfigError, ConfigResult};

/// Implemented by each configuration domain
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    /// Name used in error messages and as the YAML section key
    fn domain_name(&self) -> &'static str;

    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::domain(self.domain_name(), message)
    }
}

pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::domain(domain, format!("{} cannot be empty", field_name)));
    }
    Ok(())
}

/// Durations are checked through their integer form, so `0` means unset
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value > T::default() {
        return Ok(());
    }
    Err(ConfigError::domain(
        domain,
        format!("{} must be greater than 0, got {}", field_name, value),
    ))
}

pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<url::Url> {
    validate_required_string(url, field_name, domain)?;
    url::Url::parse(url).map_err(|e| {
        ConfigError::domain(domain, format!("{} is not a valid URL: {}", field_name, e))
    })
}

/// Progress callbacks must be absolute http(s) URLs with a host
pub fn validate_webhook_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    let parsed = validate_url(url, field_name, domain)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::domain(
            domain,
            format!(
                "{} must use http or https, not '{}'",
                field_name,
                parsed.scheme()
            ),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::domain(
            domain,
            format!("{} must name a host", field_name),
        ));
    }
    Ok(())
}

pub fn validate_port_range(port: u16, field_name: &str, domain: &str) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::domain(domain, format!("{} cannot be 0", field_name)));
    }
    if port <= 1023 {
        tracing::warn!("{} {} is a privileged port", field_name, port);
    }
    Ok(())
}
