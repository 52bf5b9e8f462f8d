use anyhow::Result;
use lectern_config::domains::logging::LogFormat;
use lectern_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Resolve the filter for a process.
///
/// An explicit level wins, then `RUST_LOG`, then the configured level.
pub fn build_env_filter(level_override: Option<&str>, config: &LoggingConfig) -> EnvFilter {
    if let Some(level) = level_override {
        match EnvFilter::try_new(level) {
            Ok(filter) => return filter,
            Err(_) => eprintln!("Invalid log level '{}', falling back to config", level),
        }
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()))
}

/// Initialize logging from configuration
pub fn init_logging_from_config(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<()> {
    let env_filter = build_env_filter(level_override, config);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // Use try_init to avoid panic if global subscriber already set
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::fmt().with_env_filter(env_filter).try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize tracing for worker processes (output to stderr to avoid IPC conflicts)
pub fn init_worker_tracing(level_override: Option<&str>) -> Result<()> {
    let env_filter = build_env_filter(level_override, &LoggingConfig::default());

    // Worker processes output to stderr; stdout carries the IPC stream
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    tracing::debug!("Worker tracing initialized");
    Ok(())
}
