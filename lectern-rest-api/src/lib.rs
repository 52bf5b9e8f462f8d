//! HTTP job surface for Lectern
//!
//! Routes (under the configured prefix, `/api/v1` by default):
//!
//! - `POST /jobs` submit a conversion of an uploaded file
//! - `GET /jobs/{id}` poll status and result
//! - `GET /jobs/{id}/stream` server-sent progress and terminal events
//! - `POST /jobs/{id}/cancel` stop the job's worker
//!
//! plus `GET /health` at the root.

pub mod app;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;

pub use app::{create_rest_app, AppConfig};
pub use context::{JobsContext, StreamSettings};
pub use errors::{RestError, RestResult};
