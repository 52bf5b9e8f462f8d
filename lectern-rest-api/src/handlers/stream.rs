//! Server-sent event stream of one job's progress
//!
//! The loop waits on the job's progress channel for at most the poll
//! interval. Events go out as they arrive; a quiet poll re-reads the
//! registry to pick up `html_ready` and the terminal status. The terminal
//! message is always the last one and is preceded by any progress still
//! queued.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use chrono::Utc;
use futures::Stream;
use lectern_core::{JobRecord, JobStatus, ProgressEvent};
use serde_json::json;
use std::convert::Infallible;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    context::JobsContext,
    errors::{RestError, RestResult},
    handlers::jobs::parse_job_id,
};

fn event(name: &str, data: serde_json::Value) -> Event {
    Event::default().event(name).data(data.to_string())
}

fn progress_event(progress: &ProgressEvent) -> Event {
    event(
        "progress",
        json!({
            "stage": progress.stage,
            "current": progress.current,
            "total": progress.total,
            "elapsed": progress.elapsed_secs(Utc::now()),
        }),
    )
}

fn terminal_event(record: &JobRecord) -> Event {
    match record.status {
        JobStatus::Completed => event("completed", json!({ "result": record.result })),
        JobStatus::Failed => event(
            "failed",
            json!({ "error": record.error.as_deref().unwrap_or("Unknown error") }),
        ),
        _ => event("cancelled", json!({})),
    }
}

/// `GET /jobs/{id}/stream`
pub async fn stream_job(
    State(ctx): State<JobsContext>,
    Path(raw_id): Path<String>,
) -> RestResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id = parse_job_id(&raw_id)?;
    if ctx.registry().get(&job_id).is_none() {
        return Err(RestError::not_found("Job not found"));
    }

    let channel = ctx.channels().get_or_create(&job_id);
    let settings = ctx.stream;
    let registry = ctx.registry().clone();
    let supervisor = ctx.supervisor.clone();

    let stream = async_stream::stream! {
        let mut html_sent = false;
        let mut last_sent = Instant::now();

        loop {
            if let Some(progress) = channel.recv_timeout(settings.poll_interval).await {
                yield Ok(progress_event(&progress));
                last_sent = Instant::now();
                continue;
            }

            let record = match registry.get(&job_id) {
                Some(record) => record,
                None => {
                    yield Ok(event("error", json!({ "message": "Job not found" })));
                    break;
                }
            };

            if record.is_terminal() {
                while let Some(progress) = channel.try_recv() {
                    yield Ok(progress_event(&progress));
                }
                yield Ok(terminal_event(&record));
                supervisor.cleanup(&job_id);
                debug!(job_id = %job_id, status = %record.status, "Stream finished");
                break;
            }

            if record.status == JobStatus::HtmlReady && !html_sent {
                if let Some(content) = record.html_content.as_deref() {
                    yield Ok(event("html_ready", json!({ "content": content })));
                    html_sent = true;
                    last_sent = Instant::now();
                }
            }

            if last_sent.elapsed() >= settings.keepalive_interval {
                yield Ok(event("ping", json!({})));
                last_sent = Instant::now();
            }
        }
    };

    Ok(Sse::new(stream))
}
