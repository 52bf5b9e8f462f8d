//! Request and response bodies

pub mod health;
pub mod jobs;

pub use health::HealthResponse;
pub use jobs::{CancelJobResponse, JobStatusResponse, SubmitJobRequest, SubmitJobResponse};
