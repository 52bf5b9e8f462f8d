//! Request handlers

pub mod health;
pub mod jobs;
pub mod stream;

pub use health::health_check;
pub use jobs::{cancel_job, get_job, submit_job};
pub use stream::stream_job;
