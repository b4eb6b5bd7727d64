//! # Configuration
//!
//! Engine settings read from the environment (after loading an optional `.env`).

use crate::error::EngineError;
use std::env;
use std::time::Duration;
use url::Url;

pub const SERVICE_URL_VAR: &str = "MORPHPORT_SERVICE_URL";
pub const CACHE_TTL_VAR: &str = "MORPHPORT_CACHE_TTL_SECS";
pub const REQUEST_TIMEOUT_VAR: &str = "MORPHPORT_REQUEST_TIMEOUT_SECS";
pub const CONSISTENCY_INTERVAL_VAR: &str = "MORPHPORT_CONSISTENCY_INTERVAL_MS";

const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8188/wavespeed/api";

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Base URL of the schema service. Endpoints are joined onto it.
    pub service_url: Url,
    /// Expiry shared by every Schema Cache entry. Default: 5 minutes.
    pub cache_ttl: Duration,
    /// Timeout of a single schema service request. Default: 30 seconds.
    pub request_timeout: Duration,
    /// Minimum spacing of the self-healing reconciliation. Default: 1 second.
    pub consistency_interval: Duration,
}

impl EngineConfig {
    /// Default timings against the given service.
    pub fn new(service_url: Url) -> Self {
        Self {
            service_url,
            cache_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            consistency_interval: Duration::from_millis(1000),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, EngineError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] against an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let service_url = lookup(SERVICE_URL_VAR).unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        let mut config = Self::new(parse_base_url(&service_url)?);

        if let Some(secs) = parse_number(&lookup, CACHE_TTL_VAR)? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_number(&lookup, REQUEST_TIMEOUT_VAR)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_number(&lookup, CONSISTENCY_INTERVAL_VAR)? {
            config.consistency_interval = Duration::from_millis(ms);
        }

        tracing::debug!(
            service_url = %config.service_url,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            "Engine configuration loaded"
        );
        Ok(config)
    }
}

/// Parses a base URL, forcing a trailing slash so `Url::join` appends to the
/// path instead of replacing its last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, EngineError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| EngineError::Config(format!("{SERVICE_URL_VAR}: {e}")))
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, EngineError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| EngineError::Config(format!("{key}: {e}")))
        })
        .transpose()
}
