use axum::http::{header, HeaderName, HeaderValue, Method};
use lectern_config::domains::server::CorsConfig;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Build the CORS layer from configuration
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let request_id = HeaderName::from_static("x-request-id");
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, request_id.clone()])
        .expose_headers([request_id])
        .max_age(Duration::from_secs(3600));

    if config.allowed_origins.iter().any(|o| o == "*") {
        if config.allow_credentials {
            tracing::warn!("CORS wildcard origin cannot carry credentials; credentials disabled");
        }
        tracing::warn!("CORS configured to allow any origin - use only in development");
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid origin '{}' in CORS configuration: {}", origin, e);
                None
            }
        })
        .collect();
    cors = cors.allow_origin(origins);

    if config.allow_credentials {
        cors = cors.allow_credentials(true);
    }

    cors
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    async fn preflight(config: CorsConfig, origin: &str) -> Option<String> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&config));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_allows_configured_origin_only() {
        let config = CorsConfig::default();
        assert_eq!(
            preflight(config.clone(), "http://localhost:5173").await.as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(preflight(config, "http://evil.example").await, None);
    }

    #[tokio::test]
    async fn test_wildcard_origin() {
        let config = CorsConfig {
            allowed_origins: vec!["*".into()],
            allow_credentials: true,
        };
        assert_eq!(preflight(config, "http://anywhere.example").await.as_deref(), Some("*"));
    }
}
