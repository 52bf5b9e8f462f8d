//! Router and middleware assembly

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use lectern_config::{domains::server::CorsConfig, ServerConfig};
use tower_http::trace::TraceLayer;

use crate::{
    context::JobsContext,
    handlers,
    middleware::{cors_layer, request_id_middleware},
};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Enable CORS middleware
    pub enable_cors: bool,
    /// Enable request ID tracking
    pub enable_request_id: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// API path prefix
    pub api_prefix: String,
    pub cors: CorsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for AppConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            enable_cors: true,
            enable_request_id: true,
            enable_tracing: true,
            api_prefix: server.api_prefix.clone(),
            cors: server.cors.clone(),
        }
    }
}

/// Create the complete REST application
pub fn create_rest_app(context: JobsContext, config: AppConfig) -> Router {
    let api = create_api_router();
    let api = if config.api_prefix.is_empty() || config.api_prefix == "/" {
        api
    } else {
        Router::new().nest(&config.api_prefix, api)
    };

    let mut app = Router::new()
        // Health endpoint (no prefix)
        .route("/health", get(handlers::health_check))
        .merge(api)
        .with_state(context);

    // Layers wrap everything added before them; the last one added runs first
    if config.enable_cors {
        app = app.layer(cors_layer(&config.cors));
    }

    if config.enable_tracing {
        app = app.layer(TraceLayer::new_for_http());
    }

    if config.enable_request_id {
        app = app.layer(middleware::from_fn(request_id_middleware));
    }

    app
}

fn create_api_router() -> Router<JobsContext> {
    Router::new()
        .route("/jobs", post(handlers::submit_job))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/jobs/{id}/stream", get(handlers::stream_job))
        .route("/jobs/{id}/cancel", post(handlers::cancel_job))
}
