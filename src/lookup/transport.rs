//! Lookup Transport
//!
//! One network exchange with the external resolution API per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::json;
use thiserror::Error;

/// Header carrying the API credential
pub const API_KEY_HEADER: &str = "x-rapidapi-key";

/// Header carrying the API host
pub const API_HOST_HEADER: &str = "x-rapidapi-host";

// == Transport Error ==
/// Failure before an HTTP status was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    /// Connection reset or body read failure mid-exchange
    #[error("i/o error: {0}")]
    Io(String),

    /// The request could not be built; retrying will not help
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Invalid(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::Invalid(err.to_string())
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

// == Upstream Response ==
/// Raw HTTP answer from the lookup API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Wait indicated by a `Retry-After` header, if any
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// == Transport Trait ==
/// Sends a single lookup request for a normalized link.
#[async_trait]
pub trait LookupTransport: Send + Sync {
    async fn send(&self, link: &str) -> Result<UpstreamResponse, TransportError>;
}

// == HTTP Transport ==
/// `reqwest`-backed transport posting `{"url": link}` to the lookup endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_host: String,
}

impl HttpTransport {
    /// Builds a transport whose every request is bounded by `request_timeout`.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_host: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_host: api_host.into(),
        })
    }
}

#[async_trait]
impl LookupTransport for HttpTransport {
    async fn send(&self, link: &str) -> Result<UpstreamResponse, TransportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_HOST_HEADER, &self.api_host)
            .json(&json!({ "url": link }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Parses a `Retry-After` value given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_dates_and_garbage() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Io("reset".into()).is_transient());
        assert!(!TransportError::Invalid("bad url".into()).is_transient());
    }

    #[test]
    fn test_success_range() {
        let mut response = UpstreamResponse {
            status: 200,
            retry_after: None,
            body: Vec::new(),
        };
        assert!(response.is_success());
        response.status = 429;
        assert!(!response.is_success());
    }
}
