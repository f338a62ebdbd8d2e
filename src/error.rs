//! Error types for the media relay
//!
//! Every failure the orchestrator surfaces is classified into exactly one
//! [`ErrorKind`] so the front-end can render a stable message per kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::ErrorResponse;

// == Error Kind ==
/// Stable classification of outcomes the front-end renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidLink,
    QueueBusy,
    UpstreamUnavailable,
    UnrecognizedResponse,
    NoUsableMedia,
    /// Not a failure: reported next to a partial result
    OversizeMedia,
}

impl ErrorKind {
    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidLink => "This link is not supported. Please check it and send it again.",
            ErrorKind::QueueBusy => "Too many downloads in progress. Please try again in a moment.",
            ErrorKind::UpstreamUnavailable => {
                "The media service is temporarily unavailable. Please try again later."
            }
            ErrorKind::UnrecognizedResponse | ErrorKind::NoUsableMedia => {
                "No media could be found for this link."
            }
            ErrorKind::OversizeMedia => "Some files were too large to send and were skipped.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidLink => "invalid_link",
            ErrorKind::QueueBusy => "queue_busy",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::UnrecognizedResponse => "unrecognized_response",
            ErrorKind::NoUsableMedia => "no_usable_media",
            ErrorKind::OversizeMedia => "oversize_media",
        }
    }
}

// == Media Error Enum ==
/// Failures surfaced by the orchestrator and the lookup client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Malformed or unsupported link, never retried
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// Admission was rejected or timed out; the caller may retry later
    #[error("Queue busy: {0}")]
    QueueBusy(String),

    /// Lookup retries exhausted or upstream refused the request
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Payload shape not understood; carries the shape fingerprint for logs
    #[error("Unrecognized response shape: {fingerprint}")]
    UnrecognizedResponse { fingerprint: String },

    /// Every resolved item was dropped by the size policy
    #[error("No usable media: {oversize_count} item(s) exceeded the size limit")]
    NoUsableMedia { oversize_count: usize },
}

impl MediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::InvalidLink(_) => ErrorKind::InvalidLink,
            MediaError::QueueBusy(_) => ErrorKind::QueueBusy,
            MediaError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            MediaError::UnrecognizedResponse { .. } => ErrorKind::UnrecognizedResponse,
            MediaError::NoUsableMedia { .. } => ErrorKind::NoUsableMedia,
        }
    }

    /// End-user message; never includes upstream payload details.
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }

    fn status_code(&self) -> StatusCode {
        match self {
            MediaError::InvalidLink(_) => StatusCode::BAD_REQUEST,
            MediaError::QueueBusy(_) => StatusCode::TOO_MANY_REQUESTS,
            MediaError::UpstreamUnavailable(_) | MediaError::UnrecognizedResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            MediaError::NoUsableMedia { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.user_message(), self.kind()));

        (self.status_code(), body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the media relay.
pub type Result<T> = std::result::Result<T, MediaError>;
