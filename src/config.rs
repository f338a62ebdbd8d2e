//! Configuration Module
//!
//! Loads relay configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::link::LinkPolicy;
use crate::lookup::RetryPolicy;
use crate::orchestrator::OrchestratorSettings;
use crate::queue::QueueLimits;

/// Longest accepted `CACHE_TTL_SECS` (30 days)
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

// == Config Error ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Relay configuration.
///
/// Every value can be set through an environment variable; see
/// [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,

    /// External resolution endpoint
    pub lookup_api_url: String,
    pub lookup_api_key: String,
    pub lookup_api_host: String,
    /// Per-attempt network timeout in milliseconds
    pub lookup_request_timeout_ms: u64,
    /// Retries after the first attempt
    pub lookup_max_retries: u32,
    pub lookup_backoff_base_ms: u64,
    pub lookup_backoff_max_ms: u64,
    /// Cap on a server-indicated Retry-After wait
    pub lookup_retry_after_cap_ms: u64,
    /// Items reporting more bytes than this are dropped
    pub max_media_bytes: u64,

    pub cache_max_entries: usize,
    pub cache_ttl_secs: u64,

    pub queue_max_global: usize,
    pub queue_max_per_caller: usize,
    pub queue_max_depth_per_caller: usize,
    pub queue_admit_timeout_ms: u64,

    /// Accepted link hosts; empty accepts any
    pub allowed_hosts: Vec<String>,
    pub usage_channel_capacity: usize,
}

impl Config {
    /// Creates a Config from environment variables, falling back to
    /// [`Config::default`] for unset or unparsable values.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` (default: 3000)
    /// - `LOOKUP_API_URL` (required), `LOOKUP_API_KEY`, `LOOKUP_API_HOST`
    /// - `LOOKUP_REQUEST_TIMEOUT_MS` (15000), `LOOKUP_MAX_RETRIES` (2)
    /// - `LOOKUP_BACKOFF_BASE_MS` (500), `LOOKUP_BACKOFF_MAX_MS` (8000)
    /// - `LOOKUP_RETRY_AFTER_CAP_MS` (30000), `MAX_MEDIA_BYTES` (50 MiB)
    /// - `CACHE_MAX_ENTRIES` (100), `CACHE_TTL_SECS` (1800)
    /// - `QUEUE_MAX_GLOBAL` (3), `QUEUE_MAX_PER_CALLER` (1)
    /// - `QUEUE_MAX_DEPTH_PER_CALLER` (5), `QUEUE_ADMIT_TIMEOUT_MS` (30000)
    /// - `ALLOWED_HOSTS` (comma-separated, default any)
    /// - `USAGE_CHANNEL_CAPACITY` (1024)
    pub fn from_env() -> Self {
        Self::from_source(|name| env::var(name).ok())
    }

    /// Builds a Config reading each variable through `lookup`.
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port),
            lookup_api_url: lookup("LOOKUP_API_URL").unwrap_or(defaults.lookup_api_url),
            lookup_api_key: lookup("LOOKUP_API_KEY").unwrap_or(defaults.lookup_api_key),
            lookup_api_host: lookup("LOOKUP_API_HOST").unwrap_or(defaults.lookup_api_host),
            lookup_request_timeout_ms: parse_or(
                &lookup,
                "LOOKUP_REQUEST_TIMEOUT_MS",
                defaults.lookup_request_timeout_ms,
            ),
            lookup_max_retries: parse_or(
                &lookup,
                "LOOKUP_MAX_RETRIES",
                defaults.lookup_max_retries,
            ),
            lookup_backoff_base_ms: parse_or(
                &lookup,
                "LOOKUP_BACKOFF_BASE_MS",
                defaults.lookup_backoff_base_ms,
            ),
            lookup_backoff_max_ms: parse_or(
                &lookup,
                "LOOKUP_BACKOFF_MAX_MS",
                defaults.lookup_backoff_max_ms,
            ),
            lookup_retry_after_cap_ms: parse_or(
                &lookup,
                "LOOKUP_RETRY_AFTER_CAP_MS",
                defaults.lookup_retry_after_cap_ms,
            ),
            max_media_bytes: parse_or(&lookup, "MAX_MEDIA_BYTES", defaults.max_media_bytes),
            cache_max_entries: parse_or(&lookup, "CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            cache_ttl_secs: parse_or(&lookup, "CACHE_TTL_SECS", defaults.cache_ttl_secs),
            queue_max_global: parse_or(&lookup, "QUEUE_MAX_GLOBAL", defaults.queue_max_global),
            queue_max_per_caller: parse_or(
                &lookup,
                "QUEUE_MAX_PER_CALLER",
                defaults.queue_max_per_caller,
            ),
            queue_max_depth_per_caller: parse_or(
                &lookup,
                "QUEUE_MAX_DEPTH_PER_CALLER",
                defaults.queue_max_depth_per_caller,
            ),
            queue_admit_timeout_ms: parse_or(
                &lookup,
                "QUEUE_ADMIT_TIMEOUT_MS",
                defaults.queue_admit_timeout_ms,
            ),
            allowed_hosts: lookup("ALLOWED_HOSTS")
                .map(|v| split_hosts(&v))
                .unwrap_or(defaults.allowed_hosts),
            usage_channel_capacity: parse_or(
                &lookup,
                "USAGE_CHANNEL_CAPACITY",
                defaults.usage_channel_capacity,
            ),
        }
    }

    // == Validation ==
    /// Rejects a missing endpoint, zero capacities, zero timeouts and an
    /// out-of-range cache TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup_api_url.trim().is_empty() {
            return Err(ConfigError::Missing("LOOKUP_API_URL"));
        }
        let scheme_ok = url::Url::parse(&self.lookup_api_url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .map_err(|e| ConfigError::Invalid {
                name: "LOOKUP_API_URL",
                reason: e.to_string(),
            })?;
        if !scheme_ok {
            return Err(ConfigError::Invalid {
                name: "LOOKUP_API_URL",
                reason: "scheme must be http or https".to_string(),
            });
        }

        let non_zero: [(&'static str, u64); 8] = [
            ("LOOKUP_REQUEST_TIMEOUT_MS", self.lookup_request_timeout_ms),
            ("LOOKUP_BACKOFF_BASE_MS", self.lookup_backoff_base_ms),
            ("CACHE_MAX_ENTRIES", self.cache_max_entries as u64),
            ("CACHE_TTL_SECS", self.cache_ttl_secs),
            ("QUEUE_MAX_GLOBAL", self.queue_max_global as u64),
            ("QUEUE_MAX_PER_CALLER", self.queue_max_per_caller as u64),
            ("QUEUE_ADMIT_TIMEOUT_MS", self.queue_admit_timeout_ms),
            ("MAX_MEDIA_BYTES", self.max_media_bytes),
        ];
        if let Some(&(name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(name));
        }

        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid {
                name: "CACHE_TTL_SECS",
                reason: format!("must not exceed {} seconds", MAX_CACHE_TTL_SECS),
            });
        }

        if self.lookup_backoff_max_ms < self.lookup_backoff_base_ms {
            return Err(ConfigError::Invalid {
                name: "LOOKUP_BACKOFF_MAX_MS",
                reason: "must not be below LOOKUP_BACKOFF_BASE_MS".to_string(),
            });
        }
        Ok(())
    }

    // == Component Settings ==
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.lookup_max_retries,
            backoff_base: Duration::from_millis(self.lookup_backoff_base_ms),
            backoff_max: Duration::from_millis(self.lookup_backoff_max_ms),
            retry_after_cap: Duration::from_millis(self.lookup_retry_after_cap_ms),
        }
    }

    pub fn queue_limits(&self) -> QueueLimits {
        QueueLimits {
            max_global: self.queue_max_global,
            max_per_caller: self.queue_max_per_caller,
            max_queue_depth_per_caller: self.queue_max_depth_per_caller,
        }
    }

    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy::new(self.allowed_hosts.clone())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            admit_timeout: Duration::from_millis(self.queue_admit_timeout_ms),
            link_policy: self.link_policy(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            lookup_api_url: String::new(),
            lookup_api_key: String::new(),
            lookup_api_host: String::new(),
            lookup_request_timeout_ms: 15_000,
            lookup_max_retries: 2,
            lookup_backoff_base_ms: 500,
            lookup_backoff_max_ms: 8_000,
            lookup_retry_after_cap_ms: 30_000,
            max_media_bytes: 50 * 1024 * 1024,
            cache_max_entries: 100,
            cache_ttl_secs: 1800,
            queue_max_global: 3,
            queue_max_per_caller: 1,
            queue_max_depth_per_caller: 5,
            queue_admit_timeout_ms: 30_000,
            allowed_hosts: Vec::new(),
            usage_channel_capacity: 1024,
        }
    }
}
