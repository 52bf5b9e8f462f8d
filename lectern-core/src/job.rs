//! Job domain model: identifiers, the status lattice and job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::types::{OutputFormat, ParseError};

/// Unique identifier for a job (newtype pattern for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        JobId(uuid)
    }
}

impl FromStr for JobId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|_| ParseError::InvalidJobId(s.to_string()))
    }
}

/// Job status.
///
/// `Pending -> Processing -> [HtmlReady ->] {Completed | Failed | Cancelled}`.
/// Terminal states never change once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, worker not yet running the conversion
    Pending,
    /// Conversion in progress
    Processing,
    /// Preview HTML published, final result still pending
    HtmlReady,
    /// Conversion finished with a result
    Completed,
    /// Conversion failed with an error
    Failed,
    /// Cancelled by a client
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Position in the lattice; terminal states share the top rank
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::HtmlReady => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }

    /// Whether a record currently in `self` may move to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::HtmlReady => "html_ready",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "html_ready" => Ok(JobStatus::HtmlReady),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(ParseError::InvalidJobStatus(s.to_string())),
        }
    }
}

/// Last progress observed for a job, kept on the record for pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub stage: String,
    pub current: u64,
    pub total: u64,
}

/// Everything known about one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Upload the job converts
    pub file_id: String,
    pub output_format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    /// Bumped by the cancellation path; older worker writes are discarded
    pub epoch: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a pending record
    pub fn new(job_id: JobId, file_id: impl Into<String>, output_format: OutputFormat) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Pending,
            file_id: file_id.into(),
            output_format,
            html_content: None,
            result: None,
            error: None,
            progress: None,
            epoch: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial record merged atomically by the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn processing() -> Self {
        Self::status(JobStatus::Processing)
    }

    pub fn html_ready(html: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::HtmlReady),
            html_content: Some(html.into()),
            ..Default::default()
        }
    }

    pub fn completed(result: JsonValue) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self::status(JobStatus::Cancelled)
    }

    pub fn progress(snapshot: ProgressSnapshot) -> Self {
        Self {
            progress: Some(snapshot),
            ..Default::default()
        }
    }

    /// Merge into `record`, overwriting only the fields this update carries
    pub(crate) fn apply_to(self, record: &mut JobRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(html) = self.html_content {
            record.html_content = Some(html);
        }
        if let Some(result) = self.result {
            record.result = Some(result);
        }
        if let Some(error) = self.error {
            record.error = Some(error);
        }
        if let Some(progress) = self.progress {
            record.progress = Some(progress);
        }
    }
}

/// What a worker needs to run one conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: JobId,
    /// Resolved path of the uploaded input; the worker deletes it when done
    pub input_path: PathBuf,
    pub output_format: OutputFormat,
    /// Converter-specific options, passed through untouched
    #[serde(default)]
    pub options: serde_json::Map<String, JsonValue>,
    /// When set, progress goes to this URL instead of the shared channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_webhook_url: Option<String>,
    /// Epoch the worker was started under; stamped on every status write
    pub epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::HtmlReady.is_terminal());
    }

    #[test]
    fn test_status_lattice() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(HtmlReady));
        assert!(HtmlReady.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Processing));
        assert!(!HtmlReady.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_status_wire_form() {
        assert_eq!(
            serde_json::to_string(&JobStatus::HtmlReady).unwrap(),
            "\"html_ready\""
        );
        assert_eq!("cancelled".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_id_parsing() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
        // Serialized as a bare UUID string
        assert_eq!(
            serde_json::to_value(id).unwrap(),
            serde_json::Value::String(id.to_string())
        );
    }

    #[test]
    fn test_update_merges_present_fields_only() {
        let mut record = JobRecord::new(JobId::new(), "abc", OutputFormat::Html);
        JobUpdate::html_ready("<p>draft</p>").apply_to(&mut record);
        JobUpdate::completed(serde_json::json!({"pages": 2})).apply_to(&mut record);

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.html_content.as_deref(), Some("<p>draft</p>"));
        assert_eq!(record.result, Some(serde_json::json!({"pages": 2})));
        assert!(record.error.is_none());
    }
}
