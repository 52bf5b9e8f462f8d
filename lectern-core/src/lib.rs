//! Core domain for Lectern
//!
//! Job records and their status lattice, the in-memory [`JobRegistry`], the
//! per-job [`ProgressChannel`] and the sinks that feed it.

pub mod error;
pub mod job;
pub mod progress;
pub mod registry;
pub mod sink;
pub mod throttle;
pub mod types;

pub use error::RegistryError;
pub use job::{ConversionJob, JobId, JobRecord, JobStatus, JobUpdate, ProgressSnapshot};
pub use progress::{ProgressChannel, ProgressChannels, ProgressEvent};
pub use registry::{JobRegistry, RejectReason, UpdateOutcome};
pub use sink::{
    ChannelProgressSink, NoopProgressSink, ProgressReporter, ProgressSink, RecordingProgressSink,
    StageProgress,
};
pub use throttle::WebhookThrottle;
pub use types::{OutputFormat, ParseError};
