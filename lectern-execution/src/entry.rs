//! Conversion entry point
//!
//! Runs inside the worker process and owns the write contract around an
//! opaque [`Converter`]: `processing` first, at most one `html_ready`, then
//! exactly one of `completed` or `failed`. The uploaded input is deleted on
//! every path out, including panics and cancellation.

use async_trait::async_trait;
use futures::FutureExt;
use lectern_core::{
    ConversionJob, JobId, JobRegistry, JobStatus, JobUpdate, OutputFormat, ProgressReporter,
    ProgressSink,
};
use serde_json::Value as JsonValue;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::ConversionError;
use crate::resources::ResourceCache;

/// Where the entry point records status changes
pub trait StatusWriter: Send + Sync {
    fn write(&self, update: JobUpdate);
}

/// Writes straight into an in-process registry
pub struct RegistryStatusWriter {
    registry: Arc<JobRegistry>,
    job_id: JobId,
    epoch: u64,
}

impl RegistryStatusWriter {
    pub fn new(registry: Arc<JobRegistry>, job_id: JobId, epoch: u64) -> Self {
        Self {
            registry,
            job_id,
            epoch,
        }
    }
}

impl StatusWriter for RegistryStatusWriter {
    fn write(&self, update: JobUpdate) {
        let outcome = self.registry.update_fenced(&self.job_id, self.epoch, update);
        if !outcome.is_applied() {
            debug!(job_id = %self.job_id, ?outcome, "Status write discarded");
        }
    }
}

/// Final payload of a successful conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutput {
    pub result: JsonValue,
}

impl ConversionOutput {
    pub fn new(result: JsonValue) -> Self {
        Self { result }
    }
}

/// A conversion back-end
#[async_trait]
pub trait Converter: Send + Sync {
    /// Shared resource this converter loads once per process
    type Resource: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn supports(&self, format: OutputFormat) -> bool;

    async fn convert(
        &self,
        ctx: &ConversionContext<'_, Self::Resource>,
    ) -> Result<ConversionOutput, ConversionError>;
}

/// What a converter sees of the job it runs
pub struct ConversionContext<'a, R> {
    job: &'a ConversionJob,
    writer: &'a dyn StatusWriter,
    progress: ProgressReporter,
    resources: &'a ResourceCache<R>,
}

impl<'a, R> ConversionContext<'a, R> {
    pub fn job_id(&self) -> JobId {
        self.job.job_id
    }

    pub fn input_path(&self) -> &Path {
        &self.job.input_path
    }

    pub fn output_format(&self) -> OutputFormat {
        self.job.output_format
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn options(&self) -> &serde_json::Map<String, JsonValue> {
        &self.job.options
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.job.options.get(key).and_then(JsonValue::as_u64)
    }

    pub fn resources(&self) -> &ResourceCache<R> {
        self.resources
    }

    /// Publish partial HTML ahead of the final result.
    ///
    /// Ignored for formats without previews; returns whether it was written.
    pub fn publish_preview(&self, html: impl Into<String>) -> bool {
        if !self.job.output_format.supports_preview() {
            return false;
        }
        self.writer.write(JobUpdate::html_ready(html));
        true
    }
}

/// Removes the uploaded input when dropped
#[derive(Debug)]
pub struct InputArtifact {
    path: PathBuf,
}

impl InputArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InputArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Input removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove input: {}", e),
        }
    }
}

/// Run one conversion, returning the terminal status written
pub async fn run<C>(
    job: &ConversionJob,
    writer: &dyn StatusWriter,
    sink: Arc<dyn ProgressSink>,
    converter: &C,
    resources: &ResourceCache<C::Resource>,
) -> JobStatus
where
    C: Converter + ?Sized,
{
    let _input = InputArtifact::new(job.input_path.clone());

    writer.write(JobUpdate::processing());
    info!(
        job_id = %job.job_id,
        converter = converter.name(),
        format = %job.output_format,
        "Conversion started"
    );

    if !converter.supports(job.output_format) {
        let error = ConversionError::InvalidInput(format!(
            "{} cannot produce {}",
            converter.name(),
            job.output_format
        ));
        writer.write(JobUpdate::failed(error.to_string()));
        return JobStatus::Failed;
    }

    let ctx = ConversionContext {
        job,
        writer,
        progress: ProgressReporter::new(sink),
        resources,
    };

    let outcome = AssertUnwindSafe(converter.convert(&ctx)).catch_unwind().await;
    match outcome {
        Ok(Ok(output)) => {
            info!(job_id = %job.job_id, "Conversion completed");
            writer.write(JobUpdate::completed(output.result));
            JobStatus::Completed
        }
        Ok(Err(e)) => {
            warn!(job_id = %job.job_id, "Conversion failed: {}", e);
            writer.write(JobUpdate::failed(e.to_string()));
            JobStatus::Failed
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(job_id = %job.job_id, "Converter panicked: {}", message);
            writer.write(JobUpdate::failed(ConversionError::Failed(message).to_string()));
            JobStatus::Failed
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "converter panicked".to_string()
    }
}
