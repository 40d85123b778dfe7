use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Bearer token clients must present; open server when unset
    pub api_token: Option<String>,
    pub rate_limit_window: Duration,
    pub sync_rate_limit_per_window: u32,
    pub max_changes_per_request: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "sync_rate_limit_per_window",
                &self.sync_rate_limit_per_window,
            )
            .field("max_changes_per_request", &self.max_changes_per_request)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            api_token: None,
            rate_limit_window: Duration::from_secs(60),
            sync_rate_limit_per_window: 120,
            max_changes_per_request: 5_000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let bind_addr = optional_trimmed(&lookup, "STRIDE_API_BIND_ADDR")
            .unwrap_or(defaults.bind_addr);
        let api_token = optional_trimmed(&lookup, "STRIDE_API_TOKEN");

        let rate_limit_window_secs = parse_in_range(
            &lookup,
            "RATE_LIMIT_WINDOW_SECS",
            defaults.rate_limit_window.as_secs(),
            10..=3_600,
        )?;
        let sync_rate_limit_per_window = parse_in_range(
            &lookup,
            "SYNC_RATE_LIMIT_PER_WINDOW",
            defaults.sync_rate_limit_per_window,
            1..=10_000,
        )?;
        let max_changes_per_request = parse_in_range(
            &lookup,
            "MAX_CHANGES_PER_REQUEST",
            defaults.max_changes_per_request,
            1..=100_000,
        )?;

        Ok(Self {
            bind_addr,
            api_token,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_rate_limit_per_window,
            max_changes_per_request,
        })
    }
}

fn parse_in_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display + Copy,
{
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<T>().map_err(|_| {
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
    Ok(value)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
