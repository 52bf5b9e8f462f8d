//! Worker execution supervisor
//!
//! Every job runs in its own OS process: the configured worker program
//! (normally this same binary) re-executed with `--worker`. The supervisor
//! talks to it over stdin/stdout, applies its status writes to the registry
//! and its progress events to the job's channel, and stops it on cancel.
//!
//! Each worker gets two tasks. The monitor owns the `Child`, turns control
//! requests into signals and publishes the exit status on a `watch`
//! channel. The reader decodes the worker's stdout.

use async_trait::async_trait;
use lectern_config::{ExecutionConfig, ProgressConfig};
use lectern_core::{
    ConversionJob, JobId, JobRegistry, JobUpdate, OutputFormat, ProgressChannel,
    ProgressChannels, RegistryError, UpdateOutcome,
};
use lectern_ipc::{
    ChildProcessTransport, CoordinatorMessage, IpcError, IpcReader, IpcWriter, WorkerMessage,
    WorkerSettings,
};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::SupervisorError;
use crate::shutdown::{
    send_sigterm, shutdown_process, ShutdownOutcome, ShutdownPolicy, StoppableProcess, WorkerExit,
};

/// Flag that switches the binary into worker mode
pub const WORKER_FLAG: &str = "--worker";

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Program to run as a worker
    pub program: PathBuf,
    /// Arguments placed before [`WORKER_FLAG`]
    pub args: Vec<String>,
    pub policy: ShutdownPolicy,
    /// Record `Failed` when a worker exits without a terminal write
    pub fail_on_worker_exit: bool,
    pub settings: WorkerSettings,
}

impl SupervisorConfig {
    /// Build from configuration, defaulting the worker to the current executable
    pub fn from_config(
        execution: &ExecutionConfig,
        progress: &ProgressConfig,
    ) -> std::io::Result<Self> {
        let program = match &execution.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };

        Ok(Self {
            program,
            args: execution.worker_args.clone(),
            policy: ShutdownPolicy {
                grace_period: execution.grace_period,
                confirm_timeout: execution.kill_confirm_timeout,
            },
            fail_on_worker_exit: execution.fail_on_worker_exit,
            settings: WorkerSettings {
                webhook_throttle_ms: progress.webhook_throttle.as_millis() as u64,
                webhook_timeout_ms: progress.webhook_timeout.as_millis() as u64,
            },
        })
    }
}

/// Job parameters handed to a new worker
#[derive(Debug, Clone)]
pub struct WorkerInput {
    pub input_path: PathBuf,
    pub output_format: OutputFormat,
    pub options: serde_json::Map<String, JsonValue>,
    pub progress_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Terminate,
    Kill,
}

/// A running (or recently exited) worker process
pub struct WorkerHandle {
    job_id: JobId,
    pid: u32,
    epoch: u64,
    control: mpsc::UnboundedSender<Control>,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
    writer: tokio::sync::Mutex<IpcWriter<ChildStdin>>,
    channel: Arc<ProgressChannel>,
    cancel_lock: tokio::sync::Mutex<()>,
}

impl WorkerHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Epoch the worker was started under
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn channel(&self) -> &Arc<ProgressChannel> {
        &self.channel
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    async fn send(&self, message: WorkerMessage) -> Result<(), IpcError> {
        self.writer.lock().await.send_message(message).await
    }
}

#[async_trait]
impl StoppableProcess for WorkerHandle {
    fn exit_status(&self) -> Option<WorkerExit> {
        *self.exit_rx.borrow()
    }

    async fn request_stop(&self) {
        if let Err(e) = self.send(WorkerMessage::Shutdown).await {
            debug!(job_id = %self.job_id, "Shutdown message not delivered: {}", e);
        }
        let _ = self.control.send(Control::Terminate);
    }

    fn force_kill(&self) {
        let _ = self.control.send(Control::Kill);
    }

    async fn wait_exit(&self, timeout: Duration) -> Option<WorkerExit> {
        let mut rx = self.exit_rx.clone();
        let waited = tokio::time::timeout(timeout, async move {
            let exit = rx.wait_for(Option::is_some).await.ok().and_then(|exit| *exit);
            exit
        })
        .await;
        waited.ok().flatten()
    }
}

/// Starts, tracks and stops worker processes
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    registry: Arc<JobRegistry>,
    channels: Arc<ProgressChannels>,
    handles: Mutex<HashMap<JobId, Arc<WorkerHandle>>>,
    /// Jobs between the start check and the handle insert
    starting: Mutex<HashSet<JobId>>,
}

/// Claim on a job id for the duration of one `start` call
struct StartReservation<'a> {
    starting: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for StartReservation<'_> {
    fn drop(&mut self) {
        self.starting.lock().remove(&self.job_id);
    }
}

impl WorkerSupervisor {
    pub fn new(
        config: SupervisorConfig,
        registry: Arc<JobRegistry>,
        channels: Arc<ProgressChannels>,
    ) -> Self {
        Self {
            config,
            registry,
            channels,
            handles: Mutex::new(HashMap::new()),
            starting: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn channels(&self) -> &Arc<ProgressChannels> {
        &self.channels
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    fn handle(&self, job_id: &JobId) -> Option<Arc<WorkerHandle>> {
        self.handles.lock().get(job_id).cloned()
    }

    /// Lock order is `handles` then `starting`.
    fn reserve(&self, job_id: JobId) -> Result<StartReservation<'_>, SupervisorError> {
        let handles = self.handles.lock();
        let mut starting = self.starting.lock();
        let live = handles
            .get(&job_id)
            .map(|handle| !handle.has_exited())
            .unwrap_or(false);
        if live || !starting.insert(job_id) {
            return Err(SupervisorError::AlreadyRunning(job_id));
        }
        Ok(StartReservation {
            starting: &self.starting,
            job_id,
        })
    }

    /// Spawn a worker for an existing job record and send it the job.
    ///
    /// Returns the worker's pid. At most one worker runs per job: a
    /// concurrent or repeated start fails with `AlreadyRunning`.
    pub async fn start(&self, job_id: JobId, input: WorkerInput) -> Result<u32, SupervisorError> {
        let _reservation = self.reserve(job_id)?;

        let epoch = self
            .registry
            .get(&job_id)
            .map(|record| record.epoch)
            .ok_or(RegistryError::NotFound(job_id))?;

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id().unwrap_or_default();
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(SupervisorError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "worker pipes unavailable",
                )))
            }
        };
        let (reader, writer) = ChildProcessTransport::from_child(stdin, stdout).into_split();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let channel = self.channels.get_or_create(&job_id);

        let handle = Arc::new(WorkerHandle {
            job_id,
            pid,
            epoch,
            control: control_tx,
            exit_rx: exit_rx.clone(),
            writer: tokio::sync::Mutex::new(writer),
            channel: channel.clone(),
            cancel_lock: tokio::sync::Mutex::new(()),
        });

        tokio::spawn(monitor_worker(child, job_id, pid, control_rx, exit_tx));
        tokio::spawn(read_worker_output(
            reader,
            WorkerOutputContext {
                job_id,
                epoch,
                registry: self.registry.clone(),
                channel,
                exit_rx,
                fail_on_worker_exit: self.config.fail_on_worker_exit,
            },
        ));

        self.handles.lock().insert(job_id, handle.clone());

        let job = ConversionJob {
            job_id,
            input_path: input.input_path,
            output_format: input.output_format,
            options: input.options,
            progress_webhook_url: input.progress_webhook_url,
            epoch,
        };
        let message = WorkerMessage::RunConversion {
            job,
            settings: self.config.settings.clone(),
        };
        if let Err(e) = handle.send(message).await {
            error!(job_id = %job_id, pid, "Failed to hand job to worker: {}", e);
            handle.force_kill();
            self.handles.lock().remove(&job_id);
            return Err(e.into());
        }

        info!(job_id = %job_id, pid, epoch, "Worker started");
        Ok(pid)
    }

    /// Stop the worker for `job_id` and record `Cancelled`.
    ///
    /// Returns `false` if no live worker is tracked for the job.
    pub async fn cancel(&self, job_id: &JobId) -> Result<bool, SupervisorError> {
        let Some(handle) = self.handle(job_id) else {
            return Ok(false);
        };

        let _guard = handle.cancel_lock.lock().await;
        if handle.has_exited() {
            return Ok(false);
        }

        // Anything the worker writes from here on carries a stale epoch
        let epoch = match self.registry.fence(job_id) {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                warn!(job_id = %job_id, "Cancelling worker without a record: {}", e);
                None
            }
        };

        info!(job_id = %job_id, pid = handle.pid, "Cancelling worker");
        let outcome = shutdown_process(handle.as_ref(), self.config.policy).await;
        if outcome == ShutdownOutcome::Unconfirmed {
            error!(job_id = %job_id, pid = handle.pid, "Worker termination could not be confirmed");
            return Err(SupervisorError::TerminationUnconfirmed(*job_id));
        }

        if let Some(epoch) = epoch {
            match self
                .registry
                .update_fenced(job_id, epoch, JobUpdate::cancelled())
            {
                UpdateOutcome::Applied(_) => info!(job_id = %job_id, ?outcome, "Job cancelled"),
                other => debug!(job_id = %job_id, ?other, "Cancelled write not applied"),
            }
        }

        self.release(job_id);
        Ok(true)
    }

    /// Release the handle and channel of a worker that exited on its own
    pub fn cleanup(&self, job_id: &JobId) {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(job_id) {
            if !handle.has_exited() {
                return;
            }
            handles.remove(job_id);
        }
        drop(handles);
        self.channels.clear(job_id);
    }

    /// Release every exited worker. Returns how many were released.
    pub fn reap_exited(&self) -> usize {
        let reaped: Vec<JobId> = {
            let mut handles = self.handles.lock();
            let exited: Vec<JobId> = handles
                .iter()
                .filter(|(_, handle)| handle.has_exited())
                .map(|(id, _)| *id)
                .collect();
            for id in &exited {
                handles.remove(id);
            }
            exited
        };

        for id in &reaped {
            self.channels.clear(id);
        }
        reaped.len()
    }

    pub fn is_active(&self, job_id: &JobId) -> bool {
        self.handle(job_id)
            .map(|handle| !handle.has_exited())
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.handles
            .lock()
            .values()
            .filter(|handle| !handle.has_exited())
            .count()
    }

    /// Cancel every live worker
    pub async fn shutdown_all(&self) {
        let live: Vec<JobId> = self
            .handles
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.has_exited())
            .map(|(id, _)| *id)
            .collect();

        if live.is_empty() {
            return;
        }
        info!(workers = live.len(), "Stopping live workers");

        let results = futures::future::join_all(live.iter().map(|id| self.cancel(id))).await;
        for (id, result) in live.iter().zip(results) {
            if let Err(e) = result {
                warn!(job_id = %id, "Worker shutdown failed: {}", e);
            }
        }
    }

    fn release(&self, job_id: &JobId) {
        self.handles.lock().remove(job_id);
        self.channels.clear(job_id);
    }
}

async fn monitor_worker(
    mut child: Child,
    job_id: JobId,
    pid: u32,
    mut control: mpsc::UnboundedReceiver<Control>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
) {
    let exit = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => WorkerExit::from(status),
                    Err(e) => {
                        warn!(job_id = %job_id, pid, "Failed to collect worker exit status: {}", e);
                        WorkerExit::unknown()
                    }
                };
            }
            Some(command) = control.recv() => match command {
                Control::Terminate => send_sigterm(pid),
                Control::Kill => {
                    if let Err(e) = child.start_kill() {
                        warn!(job_id = %job_id, pid, "Failed to kill worker: {}", e);
                    }
                }
            }
        }
    };

    if exit.success() {
        debug!(job_id = %job_id, pid, "Worker exited");
    } else {
        info!(job_id = %job_id, pid, "Worker exited with {}", exit);
    }
    exit_tx.send_replace(Some(exit));
}

struct WorkerOutputContext {
    job_id: JobId,
    epoch: u64,
    registry: Arc<JobRegistry>,
    channel: Arc<ProgressChannel>,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
    fail_on_worker_exit: bool,
}

impl WorkerOutputContext {
    fn apply(&self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Ready { worker_id, pid } => {
                debug!(job_id = %self.job_id, %worker_id, pid, "Worker ready");
            }
            CoordinatorMessage::StatusUpdate {
                job_id,
                epoch,
                update,
            } => {
                if job_id != self.job_id {
                    warn!(job_id = %self.job_id, other = %job_id, "Ignoring write for another job");
                    return;
                }
                let outcome = self.registry.update_fenced(&job_id, epoch, update);
                if !outcome.is_applied() {
                    debug!(job_id = %job_id, ?outcome, "Worker write discarded");
                }
            }
            CoordinatorMessage::Progress { job_id, event } => {
                if job_id != self.job_id {
                    warn!(
                        job_id = %self.job_id,
                        other = %job_id,
                        "Ignoring progress for another job"
                    );
                    return;
                }
                let snapshot = event.snapshot();
                self.channel.push(event);
                self.registry
                    .update_fenced(&job_id, self.epoch, JobUpdate::progress(snapshot));
            }
            CoordinatorMessage::Error { job_id, error } => {
                warn!(job_id = %self.job_id, reported_for = ?job_id, "Worker reported: {}", error);
            }
        }
    }

    /// Record `Failed` if the worker died before writing a terminal status
    async fn watch_exit(mut self) {
        let exit = match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => (*exit).unwrap_or_else(WorkerExit::unknown),
            Err(_) => WorkerExit::unknown(),
        };

        let Some(record) = self.registry.get(&self.job_id) else {
            return;
        };
        if record.is_terminal() {
            return;
        }

        let message = format!("Worker exited unexpectedly ({})", exit);
        warn!(job_id = %self.job_id, "{}", message);
        self.registry
            .update_fenced(&self.job_id, self.epoch, JobUpdate::failed(message));
    }
}

async fn read_worker_output(mut reader: IpcReader<ChildStdout>, context: WorkerOutputContext) {
    loop {
        match reader.receive::<CoordinatorMessage>().await {
            Ok(envelope) => context.apply(envelope.message),
            Err(IpcError::ConnectionClosed) => break,
            Err(e) if e.is_recoverable() => {
                warn!(job_id = %context.job_id, "Skipping malformed worker output: {}", e);
            }
            Err(e) => {
                warn!(job_id = %context.job_id, "Worker output unreadable: {}", e);
                break;
            }
        }
    }
    debug!(job_id = %context.job_id, "Worker output closed");

    if context.fail_on_worker_exit {
        context.watch_exit().await;
    }
}
