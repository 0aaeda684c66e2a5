//! Client configuration: service address and polling cadence.

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Environment variable that overrides the service address.
pub const BASE_URL_ENV: &str = "GOT_API_BASE_URL";

/// Service address used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Interval between matchmaking and game-state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on a single request before it counts as a network failure.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service address {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("service address must use http or https, got {0:?}")]
    UnsupportedScheme(String),

    #[error("service address {0} cannot carry endpoint paths")]
    NotABase(String),

    #[error("poll interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address every endpoint path is resolved against.
    pub base_url: Url,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Build a config for the given service address with default timings.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        // A trailing slash makes `Url::join` keep the last path segment.
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let url = Url::parse(&normalized).map_err(|source| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        if url.cannot_be_a_base() {
            return Err(ConfigError::NotABase(url.to_string()));
        }
        Ok(Self {
            base_url: url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        self.poll_interval = interval;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Append `segments` to the base address. Each segment is
    /// percent-encoded on its own, so ids cannot add path, query or
    /// fragment parts. An empty last segment keeps a trailing slash.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ConfigError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ConfigError::NotABase(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
