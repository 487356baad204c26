//! Process configuration.
//!
//! Build a [`HotelsConfig`] once at startup, then hand its pieces to the pool,
//! cache and recorder constructors. Values come from `Default` or from the
//! environment:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `AMADEUS_API_KEY` / `AMADEUS_API_SECRET` | required |
//! | `AMADEUS_BASE_URL` | `https://test.api.amadeus.com` |
//! | `API_TIMEOUT` (seconds) | 30 |
//! | `MAX_RETRIES` | 3 |
//! | `CLIENT_POOL_SIZE` | 5 |
//! | `ENABLE_CACHING` | true |
//! | `CACHE_MAX_SIZE` | 1000 |
//! | `CACHE_TTL` (seconds) | 300 |
//! | `METRICS_HISTORY_CAPACITY` | 1000 |
//! | `MAX_CONCURRENT_REQUESTS` | unbounded |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://test.api.amadeus.com";
const DEFAULT_POOL_SIZE: usize = 5;
const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Upstream environment selected by the base URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiEnvironment {
    Test,
    Production,
}

/// Fixed credentials and endpoint used by every client handle.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

impl ApiCredentials {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        ApiCredentials {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// `test.api.amadeus.com` is the test environment, `api.amadeus.com`
    /// production, anything else falls back to test.
    pub fn environment(&self) -> ApiEnvironment {
        if self.base_url.contains("test.api.amadeus.com") {
            ApiEnvironment::Test
        } else if self.base_url.contains("api.amadeus.com") {
            ApiEnvironment::Production
        } else {
            ApiEnvironment::Test
        }
    }
}

/// Configuration for the hotel search subsystem.
#[derive(Clone, Debug)]
pub struct HotelsConfig {
    pub credentials: ApiCredentials,
    pub api_timeout: Duration,
    pub max_retries: u32,
    pub pool_size: usize,
    pub enable_caching: bool,
    pub cache_max_size: usize,
    pub cache_default_ttl: Duration,
    pub metrics_history_capacity: usize,
    /// Cap on in-flight calls per batch; `None` fans out without limit.
    pub max_concurrent_requests: Option<usize>,
}

impl Default for HotelsConfig {
    fn default() -> Self {
        HotelsConfig {
            credentials: ApiCredentials::new("", ""),
            api_timeout: Duration::from_secs(30),
            max_retries: 3,
            pool_size: DEFAULT_POOL_SIZE,
            enable_caching: true,
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cache_default_ttl: DEFAULT_CACHE_TTL,
            metrics_history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_concurrent_requests: None,
        }
    }
}

impl HotelsConfig {
    /// Load from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if a credential is missing or a value
    /// cannot be parsed, or if the result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = HotelsConfig::default();
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::ConfigError(format!("{} is not set", name)))
        };

        let credentials = ApiCredentials {
            api_key: required("AMADEUS_API_KEY")?,
            api_secret: required("AMADEUS_API_SECRET")?,
            base_url: lookup("AMADEUS_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.credentials.base_url),
        };

        let api_timeout = match lookup("API_TIMEOUT") {
            Some(raw) => {
                let secs: f64 = parse_value("API_TIMEOUT", &raw)?;
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(Error::ConfigError(format!(
                        "API_TIMEOUT must be positive, got {}",
                        raw
                    )));
                }
                Duration::try_from_secs_f64(secs).map_err(|e| {
                    Error::ConfigError(format!("API_TIMEOUT out of range ({}): {}", raw, e))
                })?
            }
            None => defaults.api_timeout,
        };

        let config = HotelsConfig {
            credentials,
            api_timeout,
            max_retries: parse_or(&lookup, "MAX_RETRIES", defaults.max_retries)?,
            pool_size: parse_or(&lookup, "CLIENT_POOL_SIZE", defaults.pool_size)?,
            enable_caching: match lookup("ENABLE_CACHING") {
                Some(raw) => parse_bool("ENABLE_CACHING", &raw)?,
                None => defaults.enable_caching,
            },
            cache_max_size: parse_or(&lookup, "CACHE_MAX_SIZE", defaults.cache_max_size)?,
            cache_default_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_TTL",
                defaults.cache_default_ttl.as_secs(),
            )?),
            metrics_history_capacity: parse_or(
                &lookup,
                "METRICS_HISTORY_CAPACITY",
                defaults.metrics_history_capacity,
            )?,
            max_concurrent_requests: match lookup("MAX_CONCURRENT_REQUESTS") {
                Some(raw) => Some(parse_value("MAX_CONCURRENT_REQUESTS", &raw)?),
                None => None,
            },
        };

        config.validate()?;
        info!(
            "✓ Configuration loaded: pool_size={}, caching={}, cache_max_size={}, ttl={:?}",
            config.pool_size, config.enable_caching, config.cache_max_size, config.cache_default_ttl
        );
        Ok(config)
    }

    /// Reject values that would leave a component unusable.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::ConfigError("pool_size must be at least 1".to_string()));
        }
        if self.cache_max_size == 0 {
            return Err(Error::ConfigError(
                "cache_max_size must be at least 1".to_string(),
            ));
        }
        if self.metrics_history_capacity == 0 {
            return Err(Error::ConfigError(
                "metrics_history_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_requests == Some(0) {
            return Err(Error::ConfigError(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::ConfigError(format!("{} has invalid value '{}'", name, raw)))
}

fn parse_or<T, L>(lookup: &L, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::ConfigError(format!(
            "{} has invalid value '{}'",
            name, raw
        ))),
    }
}
