//! API client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid API_URL `{0}`: expected an http:// or https:// address")]
    InvalidApiUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Where the backend lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base address without a trailing slash, e.g. `http://127.0.0.1:8000`.
    pub api_url: String,
    pub timeouts: Timeouts,
}

impl ClientConfig {
    /// Config for `api_url` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiUrl`] unless the address is http(s).
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self { api_url: normalize_api_url(api_url)?, timeouts: Timeouts::default() })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `API_URL`: default `http://127.0.0.1:8000/`
    /// - `API_REQUEST_TIMEOUT_SECS`: default 30
    /// - `API_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidApiUrl`] for a non-http(s) `API_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let timeouts = Timeouts {
            request_secs: env_parse_u64("API_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("API_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(Self { api_url: normalize_api_url(&api_url)?, timeouts })
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

fn normalize_api_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let has_host = ["http://", "https://"]
        .iter()
        .any(|scheme| trimmed.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
    if !has_host {
        return Err(ConfigError::InvalidApiUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
