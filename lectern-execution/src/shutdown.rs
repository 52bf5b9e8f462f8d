//! Two-stage process termination
//!
//! A stop request first (IPC `shutdown` plus `SIGTERM`), then a forced kill if
//! the process is still alive after the grace period, then a bounded wait for
//! the OS to confirm death.

use async_trait::async_trait;
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;
use tracing::{info, warn};

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit whose status could not be collected
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<ExitStatus> for WorkerExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// Timing for [`shutdown_process`]
#[derive(Debug, Clone, Copy)]
pub struct ShutdownPolicy {
    /// Time allowed between the stop request and the forced kill
    pub grace_period: Duration,
    /// Time allowed for the kill to be confirmed
    pub confirm_timeout: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            confirm_timeout: Duration::from_secs(1),
        }
    }
}

/// How the process went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// It had already exited before anything was sent
    AlreadyExited(WorkerExit),
    /// Exited within the grace period
    Graceful(WorkerExit),
    /// Exited after the forced kill
    Forced(WorkerExit),
    /// Still not confirmed dead after the confirmation period
    Unconfirmed,
}

impl ShutdownOutcome {
    pub fn exit(&self) -> Option<WorkerExit> {
        match self {
            ShutdownOutcome::AlreadyExited(exit)
            | ShutdownOutcome::Graceful(exit)
            | ShutdownOutcome::Forced(exit) => Some(*exit),
            ShutdownOutcome::Unconfirmed => None,
        }
    }
}

/// A process that can be asked to stop, killed, and waited on
#[async_trait]
pub trait StoppableProcess: Send + Sync {
    /// Exit status if the process is known to be gone
    fn exit_status(&self) -> Option<WorkerExit>;

    /// Ask the process to stop on its own
    async fn request_stop(&self);

    /// Kill without giving the process a say
    fn force_kill(&self);

    /// Wait up to `timeout` for the process to exit
    async fn wait_exit(&self, timeout: Duration) -> Option<WorkerExit>;
}

/// Stop `process`, escalating from a stop request to a kill
pub async fn shutdown_process<P>(process: &P, policy: ShutdownPolicy) -> ShutdownOutcome
where
    P: StoppableProcess + ?Sized,
{
    if let Some(exit) = process.exit_status() {
        return ShutdownOutcome::AlreadyExited(exit);
    }

    // Phase 1: cooperative stop
    process.request_stop().await;
    if let Some(exit) = process.wait_exit(policy.grace_period).await {
        info!("Process terminated gracefully with {}", exit);
        return ShutdownOutcome::Graceful(exit);
    }

    // Phase 2: force termination
    warn!("Process did not terminate gracefully within {:?}, killing", policy.grace_period);
    process.force_kill();

    match process.wait_exit(policy.confirm_timeout).await {
        Some(exit) => {
            info!("Process terminated forcefully with {}", exit);
            ShutdownOutcome::Forced(exit)
        }
        None => {
            warn!("Process did not terminate even after force kill");
            ShutdownOutcome::Unconfirmed
        }
    }
}

/// Send `SIGTERM` to `pid`
#[cfg(unix)]
pub fn send_sigterm(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to process {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
pub fn send_sigterm(pid: u32) {
    // No signal vocabulary here; the IPC shutdown message is the only stop request
    tracing::debug!("SIGTERM unavailable for process {}", pid);
}
