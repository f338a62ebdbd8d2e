//! Request DTOs for the relay API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::link::MAX_LINK_LENGTH;

/// Maximum caller id length in characters
pub const MAX_CALLER_ID_LENGTH: usize = 128;

/// Request body for `POST /resolve`
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    /// User or session the request is attributed to for fairness
    pub caller_id: String,
    /// Raw link as the user sent it
    pub link: String,
}

impl ResolveRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid. Link
    /// syntax is checked later by normalization.
    pub fn validate(&self) -> Option<String> {
        if self.caller_id.trim().is_empty() {
            return Some("caller_id cannot be empty".to_string());
        }
        if self.caller_id.chars().count() > MAX_CALLER_ID_LENGTH {
            return Some(format!(
                "caller_id exceeds maximum length of {} characters",
                MAX_CALLER_ID_LENGTH
            ));
        }
        if self.link.trim().is_empty() {
            return Some("link cannot be empty".to_string());
        }
        if self.link.len() > MAX_LINK_LENGTH {
            return Some(format!("link exceeds maximum length of {} bytes", MAX_LINK_LENGTH));
        }
        None
    }
}
