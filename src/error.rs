//! Error types for pooled, cached hotel search operations.

use std::fmt;

/// Result type for hotel-kit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for hotel-kit.
///
/// Upstream failures are opaque to the cache, pool and fan-out layers: they
/// pass through the single-request path unchanged and are captured per slot
/// on the batch path. `Error` is `Clone` so a failed batch slot can keep it.
#[derive(Debug, Clone)]
pub enum Error {
    /// The upstream hotel API returned an error or could not be reached.
    ///
    /// `status_code` is the HTTP-level status when the upstream reported one,
    /// `error_code` the provider's numeric error code.
    Upstream {
        message: String,
        status_code: Option<u16>,
        error_code: Option<u32>,
    },

    /// Credentials were rejected by the upstream API.
    ///
    /// Never retried.
    Authentication(String),

    /// The upstream API throttled the caller (HTTP 429).
    ///
    /// Never retried by this crate; the caller decides when to come back.
    RateLimited(String),

    /// Request failed validation before any upstream call was made.
    ValidationError(String),

    /// Serialization failed when encoding a response or fingerprinting a request.
    SerializationError(String),

    /// Deserialization failed when decoding cached bytes.
    ///
    /// **Recovery:** the cache entry is evicted and recomputed.
    DeserializationError(String),

    /// Cached bytes do not carry the hotel-kit envelope header.
    ///
    /// **Recovery:** the cache entry is evicted and recomputed.
    InvalidCacheEntry(String),

    /// Cached entry was written by a different schema version.
    ///
    /// **Recovery:** the cache entry is evicted and recomputed on next access.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// A client handle was requested after the pool began shutting down.
    PoolShutdown,

    /// An upstream call exceeded the configured timeout.
    Timeout(String),

    /// Invalid or missing configuration.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Build an upstream error without status details.
    pub fn upstream(message: impl Into<String>) -> Self {
        Error::Upstream {
            message: message.into(),
            status_code: None,
            error_code: None,
        }
    }

    /// Whether a failed upstream call is worth retrying.
    ///
    /// Only transport-level failures and timeouts qualify. Authentication,
    /// throttling and validation failures would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Upstream { status_code, .. } => {
                !matches!(status_code, Some(code) if (400..500).contains(code))
            }
            Error::Timeout(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Upstream {
                message,
                status_code: Some(status),
                ..
            } => write!(f, "Upstream error ({}): {}", status, message),
            Error::Upstream { message, .. } => write!(f, "Upstream error: {}", message),
            Error::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            Error::RateLimited(msg) => write!(f, "Rate limit exceeded: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::PoolShutdown => write!(f, "Client pool is shut down"),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
