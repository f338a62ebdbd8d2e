//! Response DTOs for the relay API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::error::ErrorKind;
use crate::media::{MediaItem, MediaKind, MediaMetadata, Resolution};
use crate::orchestrator::ServiceStats;
use crate::queue::QueueStats;
use crate::tasks::UsageCounts;

/// How the front-end should send an item to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderHint {
    /// Playable media
    Video,
    Photo,
}

impl From<MediaKind> for RenderHint {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => RenderHint::Video,
            MediaKind::Image => RenderHint::Photo,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaItemResponse {
    pub url: String,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub render: RenderHint,
}

impl From<&MediaItem> for MediaItemResponse {
    fn from(item: &MediaItem) -> Self {
        Self {
            url: item.url.clone(),
            kind: item.kind,
            size_bytes: item.size_bytes,
            render: item.kind.into(),
        }
    }
}

/// Notice attached to a successful but partial result.
#[derive(Debug, Clone, Serialize)]
pub struct NoticeResponse {
    pub kind: ErrorKind,
    pub message: String,
}

/// Response body for `POST /resolve`
#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    /// Normalized link the media was resolved for
    pub link: String,
    pub items: Vec<MediaItemResponse>,
    pub oversize_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<NoticeResponse>,
    #[serde(skip_serializing_if = "MediaMetadata::is_empty")]
    pub metadata: MediaMetadata,
    pub from_cache: bool,
}

impl From<&Resolution> for ResolveResponse {
    fn from(resolution: &Resolution) -> Self {
        Self {
            link: resolution.link.clone(),
            items: resolution.items().iter().map(MediaItemResponse::from).collect(),
            oversize_count: resolution.media.oversize_count,
            notice: resolution.notice().map(|kind| NoticeResponse {
                kind,
                message: kind.user_message().to_string(),
            }),
            metadata: resolution.media.metadata.clone(),
            from_cache: resolution.from_cache,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStatsResponse,
    pub queue: QueueStats,
    pub usage: UsageCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<&CacheStats> for CacheStatsResponse {
    fn from(stats: &CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

impl StatsResponse {
    pub fn new(service: &ServiceStats, usage: UsageCounts) -> Self {
        Self {
            cache: CacheStatsResponse::from(&service.cache),
            queue: service.queue.clone(),
            usage,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            error: error.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ResolvedMedia;
    use serde_json::Value;
    use std::sync::Arc;

    fn resolution(oversize_count: usize) -> Resolution {
        Resolution {
            link: "https://example.com/p/1".to_string(),
            media: Arc::new(ResolvedMedia {
                items: vec![
                    MediaItem::new("https://cdn.example.com/a.mp4", MediaKind::Video, Some(10)),
                    MediaItem::new("https://cdn.example.com/b.jpg", MediaKind::Image, None),
                ],
                oversize_count,
                metadata: MediaMetadata::default(),
            }),
            from_cache: false,
        }
    }

    #[test]
    fn test_resolve_response_render_hints() {
        let json = serde_json::to_value(ResolveResponse::from(&resolution(0))).unwrap();

        assert_eq!(json["items"][0]["render"], "video");
        assert_eq!(json["items"][1]["render"], "photo");
        assert_eq!(json["items"][1]["kind"], "image");
        assert!(json["items"][1].get("size_bytes").is_none());
        assert!(json.get("notice").is_none());
        assert!(json.get("metadata").is_none(), "Empty metadata is omitted");
    }

    #[test]
    fn test_resolve_response_partial_notice() {
        let json = serde_json::to_value(ResolveResponse::from(&resolution(1))).unwrap();

        assert_eq!(json["oversize_count"], 1);
        assert_eq!(json["notice"]["kind"], "oversize_media");
        assert!(json["notice"]["message"].as_str().unwrap().contains("too large"));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let mut cache = CacheStats::new();
        for _ in 0..4 {
            cache.record_hit();
        }
        cache.record_miss();
        let service = ServiceStats {
            cache,
            queue: QueueStats::default(),
        };

        let resp = StatsResponse::new(&service, UsageCounts::default());
        assert!((resp.cache.hit_rate - 0.8).abs() < 0.001);

        let json: Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["queue"]["in_flight"], 0);
        assert_eq!(json["usage"]["requests"], 0);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("caller_id cannot be empty", ErrorKind::InvalidLink);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"], "caller_id cannot be empty");
        assert_eq!(json["kind"], "invalid_link");
    }
}
