//! Link Normalization
//!
//! Turns a user-supplied link into the canonical form used as cache key
//! and as the link sent to the lookup API.

use url::Url;

use crate::error::{MediaError, Result};

/// Maximum accepted link length in bytes
pub const MAX_LINK_LENGTH: usize = 2048;

// == Link Policy ==
/// Which hosts are accepted as media links.
#[derive(Debug, Clone, Default)]
pub struct LinkPolicy {
    /// Host suffixes; empty accepts any host
    allowed_hosts: Vec<String>,
}

impl LinkPolicy {
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| {
                    let h = h.trim().to_ascii_lowercase();
                    h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
                })
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Accepts any http(s) host.
    pub fn permissive() -> Self {
        Self::default()
    }

    fn allows(&self, host: &str) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }
}

// == Normalize ==
/// Canonicalizes `raw` into the cache key form.
///
/// Lowercases the host, drops a leading `www.`, the query string, the
/// fragment and any trailing slash.
pub fn normalize_link(raw: &str, policy: &LinkPolicy) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MediaError::InvalidLink("link is empty".to_string()));
    }
    if raw.len() > MAX_LINK_LENGTH {
        return Err(MediaError::InvalidLink(format!(
            "link exceeds maximum length of {} bytes",
            MAX_LINK_LENGTH
        )));
    }

    let parsed = Url::parse(raw).map_err(|e| MediaError::InvalidLink(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MediaError::InvalidLink(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| MediaError::InvalidLink("link has no host".to_string()))?
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if !policy.allows(host) {
        return Err(MediaError::InvalidLink(format!("host '{}' is not supported", host)));
    }

    let path = parsed.path().trim_end_matches('/');
    let port = parsed
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();

    Ok(format!("{}://{}{}{}", parsed.scheme(), host, port, path))
}
