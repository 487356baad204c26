//! Postcard encoding for cached upstream responses.
//!
//! The response cache holds every response type in one store, so values are
//! kept as bytes. Each entry is wrapped in a versioned envelope:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (4 bytes)│POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "HKIT"              u32                postcard::to_allocvec(T)
//! ```
//!
//! An entry whose magic or version does not match is rejected; the expander
//! evicts it and treats the lookup as a miss.
//!
//! Types stored this way must not rely on self-describing serde features
//! (`skip_serializing_if`, `flatten`, untagged enums): postcard encodes fields
//! positionally.
//!
//! ```rust
//! use hotel_kit::serialization::{serialize_for_cache, deserialize_from_cache};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Offer {
//!     id: String,
//!     total: String,
//! }
//!
//! # fn main() -> hotel_kit::Result<()> {
//! let offer = Offer { id: "OF1".to_string(), total: "120.00".to_string() };
//! let bytes = serialize_for_cache(&offer)?;
//! let decoded: Offer = deserialize_from_cache(&bytes)?;
//! assert_eq!(offer, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for hotel-kit cache entries.
pub const CACHE_MAGIC: [u8; 4] = *b"HKIT";

/// Current schema version.
///
/// Bump when any cached response type changes shape. Entries written by
/// other versions are evicted and recomputed.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for cache entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"HKIT"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The cached response
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a response with the envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if postcard encoding fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a response from cache storage, validating magic and version.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
/// - `Error::DeserializationError`: Corrupted postcard payload
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}
