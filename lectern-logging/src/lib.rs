//! Logging initialisation for Lectern
//!
//! The server logs through a `tracing` subscriber configured from
//! [`lectern_config::LoggingConfig`]. Worker processes own stdout for IPC, so
//! they get a separate stderr-only subscriber.

pub mod init;

pub use init::{
    build_env_filter, init_logging_from_config, init_simple_tracing, init_worker_tracing,
};
