//! Lookup Client
//!
//! Resolves a normalized link into media items through the external API:
//! retries transient failures, recognizes the payload shape and applies the
//! size ceiling. Stateless; caching happens in the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MediaError, Result};
use crate::lookup::parse::{extract_metadata, fingerprint, match_shape};
use crate::lookup::retry::{RetryDelay, RetryPolicy, TokioDelay};
use crate::lookup::transport::{LookupTransport, UpstreamResponse};
use crate::lookup::MediaResolver;
use crate::media::ResolvedMedia;

/// Statuses meaning the link itself was refused
const INVALID_LINK_STATUSES: &[u16] = &[400, 404, 422];

const RATE_LIMITED: u16 = 429;
const REQUEST_TIMEOUT: u16 = 408;

// == Lookup Client ==
pub struct LookupClient {
    transport: Arc<dyn LookupTransport>,
    delay: Arc<dyn RetryDelay>,
    policy: RetryPolicy,
    /// Items reporting a larger size are dropped
    max_media_bytes: u64,
}

/// What to do after a failed attempt.
enum AttemptOutcome {
    Retry { after: Duration, reason: String },
    Fail(MediaError),
}

impl LookupClient {
    // == Constructor ==
    /// Creates a client sleeping on the tokio timer between attempts.
    pub fn new(transport: Arc<dyn LookupTransport>, policy: RetryPolicy, max_media_bytes: u64) -> Self {
        Self::with_delay(transport, Arc::new(TokioDelay), policy, max_media_bytes)
    }

    /// Creates a client with a custom inter-attempt delay.
    pub fn with_delay(
        transport: Arc<dyn LookupTransport>,
        delay: Arc<dyn RetryDelay>,
        policy: RetryPolicy,
        max_media_bytes: u64,
    ) -> Self {
        Self {
            transport,
            delay,
            policy,
            max_media_bytes,
        }
    }

    // == Resolve ==
    /// Resolves `link` into the media items that pass the size policy.
    pub async fn resolve(&self, link: &str) -> Result<ResolvedMedia> {
        let body = self.fetch(link).await?;

        let payload: Value = serde_json::from_slice(&body).map_err(|e| {
            warn!(link, error = %e, bytes = body.len(), "Lookup API returned a non-JSON body");
            MediaError::UnrecognizedResponse {
                fingerprint: "non-json".to_string(),
            }
        })?;

        let shape = match_shape(&payload, link).ok_or_else(|| {
            let fingerprint = fingerprint(&payload);
            warn!(link, %fingerprint, "Unrecognized lookup response shape");
            MediaError::UnrecognizedResponse { fingerprint }
        })?;
        debug!(link, shape = shape.name(), "Recognized lookup response");

        let metadata = extract_metadata(&payload);
        let (items, oversize): (Vec<_>, Vec<_>) = shape
            .into_items()
            .into_iter()
            .partition(|item| item.size_bytes.map_or(true, |size| size <= self.max_media_bytes));

        let oversize_count = oversize.len();
        if oversize_count > 0 {
            warn!(link, oversize_count, limit = self.max_media_bytes, "Dropped oversize media items");
        }
        if items.is_empty() {
            return Err(MediaError::NoUsableMedia { oversize_count });
        }

        Ok(ResolvedMedia {
            items,
            oversize_count,
            metadata,
        })
    }

    // == Fetch ==
    /// Runs the bounded attempt loop and returns the first successful body.
    async fn fetch(&self, link: &str) -> Result<Vec<u8>> {
        let attempts = self.policy.max_attempts();

        for attempt in 0..attempts {
            debug!(link, attempt = attempt + 1, attempts, "Calling lookup API");

            let outcome = match self.transport.send(link).await {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => self.classify_status(&response, attempt),
                Err(err) if err.is_transient() => AttemptOutcome::Retry {
                    after: self.policy.backoff_for_attempt(attempt),
                    reason: err.to_string(),
                },
                Err(err) => AttemptOutcome::Fail(MediaError::UpstreamUnavailable(err.to_string())),
            };

            match outcome {
                AttemptOutcome::Fail(error) => {
                    warn!(link, attempt = attempt + 1, %error, "Lookup failed definitively");
                    return Err(error);
                }
                AttemptOutcome::Retry { reason, .. } if attempt + 1 >= attempts => {
                    warn!(link, attempts, %reason, "Lookup retries exhausted");
                    return Err(MediaError::UpstreamUnavailable(format!(
                        "{} after {} attempts",
                        reason, attempts
                    )));
                }
                AttemptOutcome::Retry { after, reason } => {
                    warn!(
                        link,
                        attempt = attempt + 1,
                        delay_ms = after.as_millis() as u64,
                        %reason,
                        "Transient lookup failure, retrying"
                    );
                    self.delay.wait(after).await;
                }
            }
        }

        Err(MediaError::UpstreamUnavailable(
            "retry loop exited unexpectedly".to_string(),
        ))
    }

    fn classify_status(&self, response: &UpstreamResponse, attempt: u32) -> AttemptOutcome {
        let status = response.status;
        match status {
            RATE_LIMITED => AttemptOutcome::Retry {
                after: self.policy.rate_limit_wait(attempt, response.retry_after),
                reason: "rate limited".to_string(),
            },
            REQUEST_TIMEOUT | 500..=599 => AttemptOutcome::Retry {
                after: self.policy.backoff_for_attempt(attempt),
                reason: format!("status {}", status),
            },
            s if INVALID_LINK_STATUSES.contains(&s) => AttemptOutcome::Fail(
                MediaError::InvalidLink(format!("lookup API refused the link (status {})", s)),
            ),
            s => AttemptOutcome::Fail(MediaError::UpstreamUnavailable(format!("status {}", s))),
        }
    }
}

#[async_trait]
impl MediaResolver for LookupClient {
    async fn resolve(&self, link: &str) -> Result<ResolvedMedia> {
        LookupClient::resolve(self, link).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::transport::TransportError;
    use crate::media::{MediaItem, MediaKind};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const VIDEO: &str = "https://cdn.example.com/v/clip.mp4";

    /// Replays scripted answers and counts calls
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<UpstreamResponse, TransportError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<std::result::Result<UpstreamResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LookupTransport for ScriptedTransport {
        async fn send(&self, link: &str) -> std::result::Result<UpstreamResponse, TransportError> {
            self.calls.lock().unwrap().push(link.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl RetryDelay for RecordingDelay {
        async fn wait(&self, delay: Duration) {
            self.waits.lock().unwrap().push(delay);
        }
    }

    fn ok(body: Value) -> std::result::Result<UpstreamResponse, TransportError> {
        Ok(UpstreamResponse {
            status: 200,
            retry_after: None,
            body: body.to_string().into_bytes(),
        })
    }

    fn status(code: u16) -> std::result::Result<UpstreamResponse, TransportError> {
        Ok(UpstreamResponse {
            status: code,
            retry_after: None,
            body: Vec::new(),
        })
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
            retry_after_cap: Duration::from_secs(10),
        }
    }

    fn lookup_client(transport: Arc<ScriptedTransport>) -> (LookupClient, Arc<RecordingDelay>) {
        let delay = Arc::new(RecordingDelay::default());
        let client = LookupClient::with_delay(transport, delay.clone(), policy(), 1_000);
        (client, delay)
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let transport = ScriptedTransport::new(vec![
            status(503),
            Err(TransportError::Timeout),
            ok(json!({"url": VIDEO})),
        ]);
        let (client, delay) = lookup_client(transport.clone());

        let media = client.resolve("https://instagram.com/p/1").await.unwrap();

        assert_eq!(media.items, vec![MediaItem::new(VIDEO, MediaKind::Video, None)]);
        assert_eq!(transport.calls(), 3);
        assert_eq!(
            *delay.waits.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_upstream_unavailable() {
        let transport = ScriptedTransport::new(vec![
            status(500),
            Err(TransportError::Connect("reset".into())),
            status(502),
        ]);
        let (client, _) = lookup_client(transport.clone());

        let result = client.resolve("https://instagram.com/p/1").await;

        assert!(matches!(result, Err(MediaError::UpstreamUnavailable(_))));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        for (code, expect_invalid) in [(400, true), (404, true), (422, true), (401, false), (403, false)] {
            let transport = ScriptedTransport::new(vec![status(code)]);
            let (client, delay) = lookup_client(transport.clone());

            let result = client.resolve("https://instagram.com/p/1").await;

            if expect_invalid {
                assert!(matches!(result, Err(MediaError::InvalidLink(_))), "status {code}");
            } else {
                assert!(matches!(result, Err(MediaError::UpstreamUnavailable(_))), "status {code}");
            }
            assert_eq!(transport.calls(), 1);
            assert!(delay.waits.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_rate_limit_honors_retry_after() {
        let transport = ScriptedTransport::new(vec![
            Ok(UpstreamResponse {
                status: 429,
                retry_after: Some(Duration::from_secs(3)),
                body: Vec::new(),
            }),
            status(429),
            ok(json!({"video_url": VIDEO})),
        ]);
        let (client, delay) = lookup_client(transport.clone());

        assert!(client.resolve("https://instagram.com/p/1").await.is_ok());
        assert_eq!(
            *delay.waits.lock().unwrap(),
            vec![Duration::from_secs(3), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        let transport = ScriptedTransport::new(vec![status(429), status(429), status(429)]);
        let (client, _) = lookup_client(transport);

        let result = client.resolve("https://instagram.com/p/1").await;
        assert!(matches!(result, Err(MediaError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_transport_error() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Invalid("bad".into()))]);
        let (client, _) = lookup_client(transport.clone());

        let result = client.resolve("https://instagram.com/p/1").await;
        assert!(matches!(result, Err(MediaError::UpstreamUnavailable(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_and_non_json_bodies() {
        let transport = ScriptedTransport::new(vec![ok(json!({"error": "private", "code": 7}))]);
        let (client, _) = lookup_client(transport);
        assert_eq!(
            client.resolve("https://instagram.com/p/1").await,
            Err(MediaError::UnrecognizedResponse {
                fingerprint: "{code:number,error:string}".to_string()
            })
        );

        let transport = ScriptedTransport::new(vec![Ok(UpstreamResponse {
            status: 200,
            retry_after: None,
            body: b"<html>".to_vec(),
        })]);
        let (client, _) = lookup_client(transport);
        assert!(matches!(
            client.resolve("https://instagram.com/p/1").await,
            Err(MediaError::UnrecognizedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversize_items_are_dropped_and_counted() {
        let transport = ScriptedTransport::new(vec![ok(json!({"media": [
            {"url": "https://cdn.example.com/big.mp4", "size": 5_000},
            {"url": "https://cdn.example.com/ok.jpg", "size": 900},
            {"url": "https://cdn.example.com/unknown.mp4"}
        ]}))]);
        let (client, _) = lookup_client(transport);

        let media = client.resolve("https://instagram.com/p/1").await.unwrap();

        assert_eq!(media.oversize_count, 1);
        let urls: Vec<&str> = media.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://cdn.example.com/ok.jpg", "https://cdn.example.com/unknown.mp4"]);
    }

    #[tokio::test]
    async fn test_all_oversize_is_no_usable_media() {
        let transport = ScriptedTransport::new(vec![ok(json!({"media": [
            {"url": "https://cdn.example.com/a.mp4", "size": 2_000},
            {"url": "https://cdn.example.com/b.mp4", "size": 3_000}
        ]}))]);
        let (client, _) = lookup_client(transport);

        assert_eq!(
            client.resolve("https://instagram.com/p/1").await,
            Err(MediaError::NoUsableMedia { oversize_count: 2 })
        );
    }

    #[tokio::test]
    async fn test_metadata_is_returned() {
        let transport = ScriptedTransport::new(vec![ok(json!({
            "title": "Reel", "source": "instagram", "url": VIDEO
        }))]);
        let (client, _) = lookup_client(transport);

        let media = client.resolve("https://instagram.com/p/1").await.unwrap();
        assert_eq!(media.metadata.title.as_deref(), Some("Reel"));
        assert_eq!(media.metadata.source.as_deref(), Some("instagram"));
    }
}
