//! Sync configuration shared by Stride clients.
//!
//! `SyncSettings` carries the server endpoint, identity, and the timing
//! policy of the sync engine (poll interval, request timeout, busy wait,
//! failure backoff cap).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BUSY_WAIT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;
const DEFAULT_MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid sync configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the sync engine
#[derive(Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Base URL of the sync server; `None` keeps the client local-only
    pub endpoint: Option<String>,
    /// Account the device syncs for
    pub user_id: String,
    /// Optional bearer token presented to the server
    pub api_token: Option<String>,
    /// Delay between periodic polls while healthy
    pub poll_interval: Duration,
    /// Network timeout for a single sync exchange
    pub request_timeout: Duration,
    /// How long a caller waits for someone else's round
    pub busy_wait_timeout: Duration,
    /// Upper bound for the failure backoff delay
    pub max_backoff: Duration,
    /// Most queue entries sent in one exchange; larger queues go out in batches
    pub max_batch_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_id: "local".to_string(),
            api_token: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            busy_wait_timeout: Duration::from_secs(DEFAULT_BUSY_WAIT_TIMEOUT_SECS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("endpoint", &self.endpoint)
            .field("user_id", &self.user_id)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field("busy_wait_timeout", &self.busy_wait_timeout)
            .field("max_backoff", &self.max_backoff)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

impl SyncSettings {
    /// Settings for a server endpoint and account
    pub fn new(endpoint: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = normalize_text_option(Some(token.into()));
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    #[must_use]
    pub const fn with_busy_wait_timeout(mut self, timeout: Duration) -> Self {
        self.busy_wait_timeout = timeout;
        self
    }

    /// Check if a sync server is configured
    pub const fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Read settings from `STRIDE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(endpoint) = normalize_text_option(lookup("STRIDE_SYNC_URL")) {
            settings.endpoint = Some(normalize_endpoint(&endpoint)?);
        }
        if let Some(user_id) = normalize_text_option(lookup("STRIDE_USER_ID")) {
            settings.user_id = user_id;
        }
        settings.api_token = normalize_text_option(lookup("STRIDE_API_TOKEN"));

        if let Some(secs) = parse_bounded(&lookup, "STRIDE_POLL_INTERVAL_SECS", 5..=3_600)? {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_bounded(&lookup, "STRIDE_REQUEST_TIMEOUT_SECS", 1..=120)? {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_bounded(&lookup, "STRIDE_SYNC_BATCH_SIZE", 1..=5_000)? {
            settings.max_batch_size = usize::try_from(size).unwrap_or(DEFAULT_MAX_BATCH_SIZE);
        }

        Ok(settings)
    }
}

/// Validate a server base URL and strip trailing slashes
pub fn normalize_endpoint(raw: &str) -> Result<String, ConfigError> {
    let endpoint = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| ConfigError::Invalid("endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::Invalid(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

fn parse_bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = normalize_text_option(lookup(name)) else {
        return Ok(None);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_local_only() {
        let settings = SyncSettings::from_lookup(lookup_from(&[])).unwrap();
        assert!(!settings.is_configured());
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.busy_wait_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_batch_size, 500);
    }

    #[test]
    fn reads_batch_size_within_server_limits() {
        let settings =
            SyncSettings::from_lookup(lookup_from(&[("STRIDE_SYNC_BATCH_SIZE", "250")])).unwrap();
        assert_eq!(settings.max_batch_size, 250);
        assert!(
            SyncSettings::from_lookup(lookup_from(&[("STRIDE_SYNC_BATCH_SIZE", "0")])).is_err()
        );
    }

    #[test]
    fn reads_endpoint_and_trims_trailing_slash() {
        let settings = SyncSettings::from_lookup(lookup_from(&[
            ("STRIDE_SYNC_URL", " https://api.example.com/ "),
            ("STRIDE_USER_ID", "user-1"),
            ("STRIDE_POLL_INTERVAL_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(settings.endpoint.as_deref(), Some("https://api.example.com"));
        assert_eq!(settings.user_id, "user-1");
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn rejects_out_of_range_interval() {
        let err = SyncSettings::from_lookup(lookup_from(&[("STRIDE_POLL_INTERVAL_SECS", "1")]))
            .unwrap_err();
        assert!(err.to_string().contains("STRIDE_POLL_INTERVAL_SECS"));
    }

    #[test]
    fn rejects_endpoint_without_scheme() {
        assert!(normalize_endpoint("api.example.com").is_err());
        assert!(normalize_endpoint("   ").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let settings =
            SyncSettings::new("https://api.example.com", "u").with_api_token("secret-token");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
