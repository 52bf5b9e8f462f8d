//! Shared state handed to every handler

use lectern_config::{ProgressConfig, StorageConfig};
use lectern_core::{JobRegistry, ProgressChannels};
use lectern_execution::WorkerSupervisor;
use std::sync::Arc;
use std::time::Duration;

/// Timing of the SSE stream loop
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// How long one wait on the progress channel lasts before re-checking the registry
    pub poll_interval: Duration,
    /// Idle time after which a `ping` is sent
    pub keepalive_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&ProgressConfig::default())
    }
}

impl From<&ProgressConfig> for StreamSettings {
    fn from(config: &ProgressConfig) -> Self {
        Self {
            poll_interval: config.stream_poll_interval,
            keepalive_interval: config.keepalive_interval,
        }
    }
}

/// Context for job endpoints
#[derive(Clone)]
pub struct JobsContext {
    pub supervisor: Arc<WorkerSupervisor>,
    pub storage: Arc<StorageConfig>,
    pub stream: StreamSettings,
}

impl JobsContext {
    pub fn new(
        supervisor: Arc<WorkerSupervisor>,
        storage: StorageConfig,
        stream: StreamSettings,
    ) -> Self {
        Self {
            supervisor,
            storage: Arc::new(storage),
            stream,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.supervisor.registry()
    }

    pub fn channels(&self) -> &Arc<ProgressChannels> {
        self.supervisor.channels()
    }
}
