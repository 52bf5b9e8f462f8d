//! Health check endpoint

use axum::{extract::State, Json};

use crate::{context::JobsContext, models::HealthResponse};

pub async fn health_check(State(ctx): State<JobsContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_workers: ctx.supervisor.active_count(),
        jobs: ctx.registry().len(),
    })
}
