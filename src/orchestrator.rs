//! Media Retrieval Orchestrator
//!
//! Composes link normalization, the cache, the admission queue and the
//! lookup client into the per-request flow:
//! `CacheCheck -> (hit: return) | (miss: admit -> resolve -> populate -> return)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheStore};
use crate::error::{MediaError, Result};
use crate::link::{normalize_link, LinkPolicy};
use crate::lookup::MediaResolver;
use crate::media::{ResolvedMedia, Resolution};
use crate::queue::{AdmissionError, AdmissionQueue, QueueStats, RequestId};

// == Settings ==
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Lifetime of a cached resolution
    pub cache_ttl: Duration,
    /// How long a request may wait for a lookup slot
    pub admit_timeout: Duration,
    pub link_policy: LinkPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(1800),
            admit_timeout: Duration::from_secs(30),
            link_policy: LinkPolicy::permissive(),
        }
    }
}

// == Service Stats ==
/// Combined cache and queue snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub queue: QueueStats,
}

// == Orchestrator ==
pub struct Orchestrator {
    resolver: Arc<dyn MediaResolver>,
    cache: Mutex<CacheStore>,
    queue: AdmissionQueue,
    settings: OrchestratorSettings,
    next_request: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        cache: CacheStore,
        queue: AdmissionQueue,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            resolver,
            cache: Mutex::new(cache),
            queue,
            settings,
            next_request: AtomicU64::new(1),
        }
    }

    /// Allocates an id the caller can later pass to [`Orchestrator::cancel`].
    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    // == Resolve ==
    /// Resolves `raw_link` for `caller_id` under a freshly allocated request id.
    pub async fn resolve(&self, caller_id: &str, raw_link: &str) -> Result<Resolution> {
        let request_id = self.next_request_id();
        self.resolve_request(caller_id, request_id, raw_link).await
    }

    /// Resolves `raw_link` for `caller_id` under `request_id`.
    ///
    /// A successful result is cached before the admission slot is released,
    /// so a request queued behind it finds the entry. Failures are never
    /// cached and release the slot before the error propagates.
    pub async fn resolve_request(
        &self,
        caller_id: &str,
        request_id: RequestId,
        raw_link: &str,
    ) -> Result<Resolution> {
        let link = normalize_link(raw_link, &self.settings.link_policy)?;

        if let Some(media) = self.cached(&link).await {
            debug!(caller = caller_id, %link, "Served from cache");
            return Ok(Resolution {
                link,
                media,
                from_cache: true,
            });
        }

        let handle = self
            .queue
            .admit(caller_id, request_id, self.settings.admit_timeout)
            .await
            .map_err(|err| {
                warn!(caller = caller_id, request = %request_id, error = %err, "Lookup not admitted");
                queue_busy(err)
            })?;

        // an identical lookup may have finished while this one waited
        if let Some(media) = self.cached(&link).await {
            debug!(caller = caller_id, %link, "Served from cache after admission");
            handle.release();
            return Ok(Resolution {
                link,
                media,
                from_cache: true,
            });
        }

        let media = match self.resolver.resolve(&link).await {
            Ok(media) => Arc::new(media),
            Err(err) => {
                handle.release();
                warn!(caller = caller_id, %link, kind = err.kind().as_str(), error = %err, "Lookup failed");
                return Err(err);
            }
        };

        self.cache
            .lock()
            .await
            .put(link.clone(), Arc::clone(&media), self.settings.cache_ttl);
        handle.release();
        info!(
            caller = caller_id,
            %link,
            items = media.items.len(),
            oversize = media.oversize_count,
            "Resolved media"
        );

        Ok(Resolution {
            link,
            media,
            from_cache: false,
        })
    }

    async fn cached(&self, link: &str) -> Option<Arc<ResolvedMedia>> {
        self.cache.lock().await.get(link).ok()
    }

    // == Cancel ==
    /// Withdraws a request still waiting for admission. Admitted lookups run
    /// to completion.
    pub fn cancel(&self, caller_id: &str, request_id: RequestId) -> bool {
        self.queue.cancel(caller_id, request_id)
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.lock().await.stats(),
            queue: self.queue.stats(),
        }
    }
}

fn queue_busy(err: AdmissionError) -> MediaError {
    MediaError::QueueBusy(err.to_string())
}
