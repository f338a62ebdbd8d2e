//! Lookup Module
//!
//! Client for the external media-resolution API.

mod client;
mod parse;
mod retry;
mod transport;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::ResolvedMedia;

pub use client::LookupClient;
pub use parse::{extract_metadata, fingerprint, match_shape, ResponseShape};
pub use retry::{RetryDelay, RetryPolicy, TokioDelay};
pub use transport::{
    HttpTransport, LookupTransport, TransportError, UpstreamResponse, API_HOST_HEADER,
    API_KEY_HEADER,
};

// == Media Resolver ==
/// Anything that can turn a normalized link into media.
///
/// The orchestrator depends on this seam so it can run against a fake.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, link: &str) -> Result<ResolvedMedia>;
}
