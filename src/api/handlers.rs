//! API Handlers
//!
//! HTTP request handlers for each relay endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::error::{MediaError, Result};
use crate::models::{HealthResponse, ResolveRequest, ResolveResponse, StatsResponse};
use crate::orchestrator::Orchestrator;
use crate::tasks::{UsageEvent, UsageReporter, UsageTally};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Fire-and-forget usage events
    pub usage: UsageReporter,
    /// Counters filled by the usage task
    pub tally: UsageTally,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, usage: UsageReporter, tally: UsageTally) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            usage,
            tally,
        }
    }
}

/// Handler for POST /resolve
///
/// Resolves a link into media items, from the cache when possible.
pub async fn resolve_handler(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(MediaError::InvalidLink(error_msg));
    }

    let caller_id = req.caller_id;
    state.usage.report(UsageEvent::RequestReceived {
        caller_id: caller_id.clone(),
    });

    match state.orchestrator.resolve(&caller_id, &req.link).await {
        Ok(resolution) => {
            let event = if resolution.from_cache {
                UsageEvent::CacheHit { caller_id }
            } else {
                UsageEvent::LookupSucceeded {
                    caller_id,
                    items: resolution.items().len(),
                }
            };
            state.usage.report(event);
            Ok(Json(ResolveResponse::from(&resolution)))
        }
        Err(err) => {
            state.usage.report(UsageEvent::LookupFailed {
                caller_id,
                kind: err.kind(),
            });
            Err(err)
        }
    }
}

/// Handler for GET /stats
///
/// Returns cache, queue and usage counters.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let service = state.orchestrator.stats().await;
    Json(StatsResponse::new(&service, state.tally.snapshot()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::error::ErrorKind;
    use crate::lookup::MediaResolver;
    use crate::media::{MediaItem, MediaKind, MediaMetadata, ResolvedMedia};
    use crate::orchestrator::OrchestratorSettings;
    use crate::queue::{AdmissionQueue, QueueLimits};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct StaticResolver;

    #[async_trait]
    impl MediaResolver for StaticResolver {
        async fn resolve(&self, link: &str) -> Result<ResolvedMedia> {
            if link.contains("missing") {
                return Err(MediaError::NoUsableMedia { oversize_count: 1 });
            }
            Ok(ResolvedMedia {
                items: vec![MediaItem::new("https://cdn.example.com/a.jpg", MediaKind::Image, None)],
                oversize_count: 0,
                metadata: MediaMetadata::default(),
            })
        }
    }

    fn state() -> (AppState, mpsc::Receiver<UsageEvent>) {
        let orchestrator = Orchestrator::new(
            Arc::new(StaticResolver),
            CacheStore::new(10),
            AdmissionQueue::new(QueueLimits::default()),
            OrchestratorSettings::default(),
        );
        let (usage, rx) = UsageReporter::channel(16);
        (AppState::new(orchestrator, usage, UsageTally::new()), rx)
    }

    fn request(link: &str) -> Json<ResolveRequest> {
        Json(ResolveRequest {
            caller_id: "alice".to_string(),
            link: link.to_string(),
        })
    }

    #[tokio::test]
    async fn test_resolve_then_cache_hit_reports_usage() {
        let (state, mut rx) = state();

        let first = resolve_handler(State(state.clone()), request("https://example.com/p/1"))
            .await
            .unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.items.len(), 1);

        let second = resolve_handler(State(state), request("https://example.com/p/1/"))
            .await
            .unwrap();
        assert!(second.from_cache);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events[0], UsageEvent::RequestReceived { .. }));
        assert!(matches!(events[1], UsageEvent::LookupSucceeded { items: 1, .. }));
        assert!(matches!(events[3], UsageEvent::CacheHit { .. }));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_failure_reports_kind() {
        let (state, mut rx) = state();

        let err = resolve_handler(State(state), request("https://example.com/missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoUsableMedia);

        rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            UsageEvent::LookupFailed {
                caller_id: "alice".to_string(),
                kind: ErrorKind::NoUsableMedia,
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_reporting() {
        let (state, mut rx) = state();

        let req = Json(ResolveRequest {
            caller_id: String::new(),
            link: "https://example.com/p/1".to_string(),
        });
        let err = resolve_handler(State(state), req).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidLink);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _rx) = state();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.cache.hits, 0);
        assert_eq!(response.queue.in_flight, 0);
        assert_eq!(response.usage.requests, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
