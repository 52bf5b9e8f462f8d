//! Job execution for Lectern
//!
//! The server side runs a [`WorkerSupervisor`] that spawns one worker
//! process per job and stops it on cancel. The worker side runs
//! [`run_worker`], which hands the job to a [`Converter`] through the
//! [`entry::run`] boundary.

pub mod converter;
pub mod entry;
pub mod error;
pub mod resources;
pub mod shutdown;
pub mod sinks;
pub mod supervisor;
pub mod worker;

pub use converter::{TextDocumentConverter, TextRenderer, PAGE_DELAY_OPTION};
pub use entry::{
    ConversionContext, ConversionOutput, Converter, InputArtifact, RegistryStatusWriter,
    StatusWriter,
};
pub use error::{ConversionError, ExecutionError, SupervisorError};
pub use resources::ResourceCache;
pub use shutdown::{
    shutdown_process, ShutdownOutcome, ShutdownPolicy, StoppableProcess, WorkerExit,
};
pub use sinks::{IpcProgressSink, IpcStatusWriter, WebhookPayload, WebhookProgressSink};
pub use supervisor::{SupervisorConfig, WorkerHandle, WorkerInput, WorkerSupervisor, WORKER_FLAG};
pub use worker::run_worker;
