//! Cache key construction for upstream calls.
//!
//! A key is `"{operation}:{digest}"` where `digest` is the hex SHA-256 of the
//! postcard encoding of the request's canonical form. Postcard writes struct
//! fields in declaration order, so two equal requests always produce the same
//! bytes. The operation name prefix keeps different operations apart and makes
//! operation-scoped invalidation a prefix match.

use std::borrow::Cow;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Separator between the operation namespace and the request digest.
pub const KEY_SEPARATOR: char = ':';

/// A request that can be turned into a deterministic cache key.
///
/// Override [`Fingerprint::normalized`] when a request carries fields whose
/// order does not change meaning (filter lists). The default uses
/// the request as-is.
pub trait Fingerprint: Serialize + Clone {
    /// Canonical form used for hashing.
    fn normalized(&self) -> Cow<'_, Self> {
        Cow::Borrowed(self)
    }
}

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build the cache key for `request` under `operation`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the request cannot be encoded.
    pub fn build<R: Fingerprint>(operation: &str, request: &R) -> Result<String> {
        let canonical = request.normalized();
        let bytes = postcard::to_allocvec(canonical.as_ref())
            .map_err(|e| Error::SerializationError(format!("fingerprint {}: {}", operation, e)))?;
        let digest = Sha256::digest(&bytes);

        Ok(format!("{}{}{}", operation, KEY_SEPARATOR, hex::encode(digest)))
    }

    /// Prefix shared by every key of `operation`.
    pub fn operation_prefix(operation: &str) -> String {
        format!("{}{}", operation, KEY_SEPARATOR)
    }
}

/// Sort and deduplicate an optional list so its order does not affect keys.
pub fn normalize_list<T: Ord>(list: &mut Option<Vec<T>>) {
    if let Some(items) = list {
        items.sort();
        items.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize)]
    struct SearchRequest {
        latitude: f64,
        longitude: f64,
        amenities: Option<Vec<String>>,
    }

    impl Fingerprint for SearchRequest {
        fn normalized(&self) -> Cow<'_, Self> {
            let mut canonical = self.clone();
            normalize_list(&mut canonical.amenities);
            Cow::Owned(canonical)
        }
    }

    fn request(amenities: &[&str]) -> SearchRequest {
        SearchRequest {
            latitude: 48.8566,
            longitude: 2.3522,
            amenities: Some(amenities.iter().map(|a| a.to_string()).collect()),
        }
    }

    #[test]
    fn test_equal_requests_share_key() {
        let a = CacheKeyBuilder::build("hotels_by_location", &request(&["SPA"])).unwrap();
        let b = CacheKeyBuilder::build("hotels_by_location", &request(&["SPA"])).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("hotels_by_location:"));
        // 64 hex chars of SHA-256 after the prefix
        assert_eq!(a.len(), "hotels_by_location:".len() + 64);
    }

    #[test]
    fn test_reordered_lists_share_key() {
        let a = CacheKeyBuilder::build("op", &request(&["SPA", "WIFI"])).unwrap();
        let b = CacheKeyBuilder::build("op", &request(&["WIFI", "SPA", "WIFI"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_operations_are_namespaced() {
        let a = CacheKeyBuilder::build("hotels_by_location", &request(&[])).unwrap();
        let b = CacheKeyBuilder::build("hotel_offers", &request(&[])).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            a.split_once(KEY_SEPARATOR).map(|(_, d)| d),
            b.split_once(KEY_SEPARATOR).map(|(_, d)| d)
        );
    }

    #[test]
    fn test_different_requests_differ() {
        let mut other = request(&["SPA"]);
        other.latitude = 40.4168;
        let a = CacheKeyBuilder::build("op", &request(&["SPA"])).unwrap();
        let b = CacheKeyBuilder::build("op", &other).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_operation_prefix() {
        assert_eq!(CacheKeyBuilder::operation_prefix("hotel_offers"), "hotel_offers:");
    }
}
