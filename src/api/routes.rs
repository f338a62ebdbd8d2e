//! API Routes
//!
//! Configures the Axum router with all relay endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health_handler, resolve_handler, stats_handler, AppState};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /resolve` - Resolve a link into media items
/// - `GET /stats` - Cache, queue and usage counters
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/resolve", post(resolve_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::error::Result;
    use crate::lookup::MediaResolver;
    use crate::media::ResolvedMedia;
    use crate::orchestrator::{Orchestrator, OrchestratorSettings};
    use crate::queue::{AdmissionQueue, QueueLimits};
    use crate::tasks::{UsageReporter, UsageTally};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    struct Unreachable;

    #[async_trait]
    impl MediaResolver for Unreachable {
        async fn resolve(&self, _link: &str) -> Result<ResolvedMedia> {
            Err(crate::error::MediaError::UpstreamUnavailable("offline".into()))
        }
    }

    fn create_test_app() -> Router {
        let orchestrator = Orchestrator::new(
            Arc::new(Unreachable),
            CacheStore::new(10),
            AdmissionQueue::new(QueueLimits::default()),
            OrchestratorSettings::default(),
        );
        let (usage, _rx) = UsageReporter::channel(4);
        create_router(AppState::new(orchestrator, usage, UsageTally::new()))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_resolve_upstream_down() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/resolve")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"caller_id":"7","link":"https://example.com/p/1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_resolve_wrong_method() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/resolve").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
