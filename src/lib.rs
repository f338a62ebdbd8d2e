//! Media Relay - resolves user-supplied media links through an external lookup API
//!
//! A bounded TTL/LRU cache and a fair, concurrency-limited admission queue
//! sit between callers and the unreliable lookup service.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod link;
pub mod lookup;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{ErrorKind, MediaError};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use tasks::spawn_usage_task;
