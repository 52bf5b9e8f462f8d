//! Job request/response models

use lectern_core::{JobId, JobRecord, JobStatus, ProgressSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Body of `POST /jobs`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobRequest {
    /// Id returned by the upload step; names `<upload_dir>/<file_id>.<ext>`
    pub file_id: String,
    #[serde(default)]
    pub output_format: Option<String>,
    /// Converter options, passed to the worker untouched
    #[serde(default)]
    pub options: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub progress_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

/// Body of `GET /jobs/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            progress: record.progress,
            html_content: record.html_content,
            result: record.result,
            error: record.error,
        }
    }
}

/// Body of `POST /jobs/{id}/cancel`
#[derive(Debug, Clone, Serialize)]
pub struct CancelJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_finished: bool,
}

impl CancelJobResponse {
    pub fn cancelled(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Cancelled,
            already_finished: false,
        }
    }

    pub fn already_finished(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            already_finished: true,
        }
    }
}
