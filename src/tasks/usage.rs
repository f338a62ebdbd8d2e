//! Usage Reporting Task
//!
//! Fire-and-forget usage events. Reporting never blocks request handling:
//! a full channel drops the event.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;

// == Usage Event ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageEvent {
    RequestReceived { caller_id: String },
    CacheHit { caller_id: String },
    LookupSucceeded { caller_id: String, items: usize },
    LookupFailed { caller_id: String, kind: ErrorKind },
}

impl UsageEvent {
    pub fn caller_id(&self) -> &str {
        match self {
            UsageEvent::RequestReceived { caller_id }
            | UsageEvent::CacheHit { caller_id }
            | UsageEvent::LookupSucceeded { caller_id, .. }
            | UsageEvent::LookupFailed { caller_id, .. } => caller_id,
        }
    }
}

// == Usage Reporter ==
/// Sending half handed to request handlers.
#[derive(Debug, Clone)]
pub struct UsageReporter {
    tx: mpsc::Sender<UsageEvent>,
}

impl UsageReporter {
    /// Creates a reporter and the receiver its events arrive on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UsageEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues `event` without waiting. Returns false if it was dropped.
    pub fn report(&self, event: UsageEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(caller = event.caller_id(), "Usage channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

// == Usage Tally ==
/// Counters accumulated from the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageCounts {
    pub requests: u64,
    pub cache_hits: u64,
    pub lookups_succeeded: u64,
    pub lookups_failed: u64,
    pub media_items_served: u64,
}

/// Shared view of [`UsageCounts`] the stats endpoint reads.
#[derive(Debug, Clone, Default)]
pub struct UsageTally {
    counts: Arc<Mutex<UsageCounts>>,
}

impl UsageTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UsageCounts {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: &UsageEvent) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            UsageEvent::RequestReceived { .. } => counts.requests += 1,
            UsageEvent::CacheHit { .. } => counts.cache_hits += 1,
            UsageEvent::LookupSucceeded { items, .. } => {
                counts.lookups_succeeded += 1;
                counts.media_items_served += *items as u64;
            }
            UsageEvent::LookupFailed { .. } => counts.lookups_failed += 1,
        }
    }
}

/// Spawns the task draining usage events into `tally`.
///
/// Runs until every [`UsageReporter`] is dropped or the task is aborted
/// during shutdown.
pub fn spawn_usage_task(mut rx: mpsc::Receiver<UsageEvent>, tally: UsageTally) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Usage reporting task started");

        while let Some(event) = rx.recv().await {
            match &event {
                UsageEvent::LookupFailed { caller_id, kind } => {
                    info!(caller = %caller_id, kind = kind.as_str(), "Lookup failed");
                }
                other => debug!(event = ?other, "Usage event"),
            }
            tally.record(&event);
        }

        info!("Usage reporting task stopped");
    })
}
