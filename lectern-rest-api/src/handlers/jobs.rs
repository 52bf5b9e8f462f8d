//! Job submission, polling and cancellation

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use lectern_config::{validation::validate_webhook_url, StorageConfig};
use lectern_core::{JobId, JobStatus, JobUpdate, OutputFormat};
use lectern_execution::{SupervisorError, WorkerInput};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::{
    context::JobsContext,
    errors::{RestError, RestResult},
    middleware::RequestId,
    models::{CancelJobResponse, JobStatusResponse, SubmitJobRequest, SubmitJobResponse},
};

const MAX_FILE_ID_LEN: usize = 128;

/// Parse a job id from the path; malformed ids are rejected up front
pub(crate) fn parse_job_id(raw: &str) -> RestResult<JobId> {
    raw.parse()
        .map_err(|_| RestError::bad_request(format!("Invalid job id '{}'", raw)))
}

/// File ids name files inside the upload directory, so only `[A-Za-z0-9_-]`
fn validate_file_id(file_id: &str) -> RestResult<()> {
    if file_id.is_empty() {
        return Err(RestError::validation_error("file_id cannot be empty"));
    }
    if file_id.len() > MAX_FILE_ID_LEN {
        return Err(RestError::validation_error("file_id is too long"));
    }
    if !file_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RestError::validation_error(
            "file_id may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

/// Find `<upload_dir>/<file_id><ext>` for the first supported extension present
async fn resolve_upload(storage: &StorageConfig, file_id: &str) -> Option<PathBuf> {
    for ext in &storage.supported_extensions {
        let candidate = storage.upload_dir.join(format!("{}{}", file_id, ext));
        if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
            if metadata.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// `POST /jobs`
pub async fn submit_job(
    State(ctx): State<JobsContext>,
    request_id: RequestId,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> RestResult<(StatusCode, Json<SubmitJobResponse>)> {
    let Json(request) = payload?;

    validate_file_id(&request.file_id)?;
    let output_format = match request.output_format.as_deref() {
        Some(raw) => raw
            .parse::<OutputFormat>()
            .map_err(|e| RestError::validation_error(e.to_string()))?,
        None => OutputFormat::default(),
    };
    if let Some(url) = request.progress_webhook_url.as_deref() {
        validate_webhook_url(url, "progress_webhook_url", "request")
            .map_err(|e| RestError::validation_error(e.to_string()))?;
    }

    let input_path = resolve_upload(&ctx.storage, &request.file_id)
        .await
        .ok_or_else(|| RestError::not_found("File not found. Upload first."))?;

    let job_id = JobId::new();
    ctx.registry()
        .create(job_id, request.file_id.clone(), output_format)
        .map_err(|e| RestError::internal_error(e.to_string()))?;

    let input = WorkerInput {
        input_path,
        output_format,
        options: request.options,
        progress_webhook_url: request.progress_webhook_url,
    };

    match ctx.supervisor.start(job_id, input).await {
        Ok(pid) => {
            info!(%request_id, job_id = %job_id, pid, format = %output_format, "Job submitted");
            Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
        }
        Err(e) => {
            error!(%request_id, job_id = %job_id, "Failed to start worker: {}", e);
            ctx.registry()
                .update(&job_id, JobUpdate::failed(format!("Failed to start worker: {}", e)));
            Err(RestError::ServiceUnavailable(
                "Failed to start conversion worker".to_string(),
            ))
        }
    }
}

/// `GET /jobs/{id}`
pub async fn get_job(
    State(ctx): State<JobsContext>,
    Path(raw_id): Path<String>,
) -> RestResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    let record = ctx
        .registry()
        .get(&job_id)
        .ok_or_else(|| RestError::not_found("Job not found"))?;
    Ok(Json(JobStatusResponse::from(record)))
}

/// `POST /jobs/{id}/cancel`
pub async fn cancel_job(
    State(ctx): State<JobsContext>,
    Path(raw_id): Path<String>,
) -> RestResult<Json<CancelJobResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    let record = ctx
        .registry()
        .get(&job_id)
        .ok_or_else(|| RestError::not_found("Job not found"))?;

    if record.is_terminal() {
        return Ok(Json(CancelJobResponse::already_finished(job_id, record.status)));
    }

    match ctx.supervisor.cancel(&job_id).await {
        Ok(true) => {
            // The worker may have written its own terminal status just before dying
            match ctx.registry().get(&job_id) {
                Some(record) if record.is_terminal() && record.status != JobStatus::Cancelled => {
                    Ok(Json(CancelJobResponse::already_finished(job_id, record.status)))
                }
                _ => Ok(Json(CancelJobResponse::cancelled(job_id))),
            }
        }
        Ok(false) => match ctx.registry().get(&job_id) {
            Some(record) if record.is_terminal() => {
                Ok(Json(CancelJobResponse::already_finished(job_id, record.status)))
            }
            Some(_) => {
                warn!(job_id = %job_id, "Cancel requested for job without a live worker");
                Err(RestError::conflict("Job has no running worker"))
            }
            None => Err(RestError::not_found("Job not found")),
        },
        Err(SupervisorError::TerminationUnconfirmed(_)) => Err(RestError::internal_error(
            "Worker did not stop; cancellation unconfirmed",
        )),
        Err(e) => Err(RestError::internal_error(e.to_string())),
    }
}
