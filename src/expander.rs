//! Cache expander - cache-aside entry point for upstream calls.
//!
//! [`CacheExpander::get_or_compute`] looks the request up by its fingerprint
//! key and only runs the producer on a miss. Successful results are stored as
//! enveloped postcard bytes, so a single store serves every response type.
//! Failed producers are never cached.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::key::{CacheKeyBuilder, Fingerprint};
use crate::observability::TtlPolicy;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use crate::store::CacheStore;

const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for per-operation overrides.
///
/// `ttl_override` takes precedence over the expander's [`TtlPolicy`];
/// `retry_count` is the number of extra attempts after the first failure.
///
/// ```
/// use hotel_kit::OperationConfig;
/// use std::time::Duration;
///
/// let config = OperationConfig::default()
///     .with_ttl(Duration::from_secs(60))
///     .with_retry(2);
/// assert_eq!(config.retry_count, 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct OperationConfig {
    /// Override the TTL for this operation only.
    pub ttl_override: Option<Duration>,

    /// Number of retry attempts for this operation (0 = no retry).
    pub retry_count: u32,
}

impl OperationConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }
}

/// Snapshot of the response cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub default_ttl_secs: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

/// Cache-aside orchestrator over a [`CacheStore`] of encoded responses.
pub struct CacheExpander {
    store: CacheStore<Vec<u8>>,
    hits: AtomicU64,
    misses: AtomicU64,
    ttl_policy: TtlPolicy,
}

impl CacheExpander {
    pub fn new(store: CacheStore<Vec<u8>>) -> Self {
        info!(
            "✓ Response cache initialized (max_size={}, default_ttl={:?})",
            store.max_size(),
            store.default_ttl()
        );
        CacheExpander {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ttl_policy: TtlPolicy::default(),
        }
    }

    /// Set the TTL policy used when a call gives no explicit TTL.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// Return the cached response for `request`, or run `producer` and cache
    /// its result.
    ///
    /// TTL precedence: `ttl`, then the [`TtlPolicy`], then the store default.
    /// A cached entry that no longer decodes is evicted and counts as a miss.
    ///
    /// # Errors
    ///
    /// Producer errors are returned unchanged and nothing is cached. Fails
    /// with `Error::SerializationError` if the request or the result cannot
    /// be encoded.
    pub async fn get_or_compute<R, T, F, Fut>(
        &self,
        operation: &str,
        request: &R,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T>
    where
        R: Fingerprint,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cache_key = CacheKeyBuilder::build(operation, request)?;

        if let Some(bytes) = self.store.get(&cache_key) {
            match deserialize_from_cache::<T>(&bytes) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("✓ Cache hit for {}", cache_key);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Evicting undecodable cache entry {}: {}", cache_key, e);
                    self.store.remove(&cache_key);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("✗ Cache miss for {}, calling producer", cache_key);

        let value = match producer().await {
            Ok(value) => value,
            Err(e) => {
                error!("Producer for {} failed: {}", operation, e);
                return Err(e);
            }
        };

        let ttl = ttl.or_else(|| self.ttl_policy.get_ttl(operation));
        let bytes = serialize_for_cache(&value)?;
        self.store.set(&cache_key, bytes, ttl);
        debug!("Cache SET {} (ttl={:?})", cache_key, ttl);

        Ok(value)
    }

    /// [`get_or_compute`](Self::get_or_compute) with a TTL override and
    /// retries of the producer on retryable failures.
    ///
    /// # Errors
    ///
    /// Same as `get_or_compute`; the last producer error is returned once
    /// retries run out.
    pub async fn with_config<R, T, F, Fut>(
        &self,
        operation: &str,
        request: &R,
        config: OperationConfig,
        producer: F,
    ) -> Result<T>
    where
        R: Fingerprint,
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute(operation, request, config.ttl_override, || {
            retry_with_backoff(config.retry_count, producer)
        })
        .await
    }

    /// Remove every cached response of `operation`.
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        let removed = self
            .store
            .invalidate_by_prefix(&CacheKeyBuilder::operation_prefix(operation));
        debug!("Invalidated {} entries for operation {}", removed, operation);
        removed
    }

    /// Remove every cached response whose key contains `pattern`.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let removed = self.store.invalidate_by_substring(pattern);
        debug!("Invalidated {} entries matching '{}'", removed, pattern);
        removed
    }

    /// Drop all entries and reset the hit and miss counters.
    pub fn clear(&self) {
        self.store.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store.stats();
        let hit_count = self.hits.load(Ordering::Relaxed);
        let miss_count = self.misses.load(Ordering::Relaxed);
        let total_requests = hit_count + miss_count;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            hit_count as f64 / total_requests as f64
        };

        CacheStats {
            size: store.size,
            max_size: store.max_size,
            default_ttl_secs: store.default_ttl_secs,
            hit_count,
            miss_count,
            total_requests,
            hit_rate,
        }
    }

    pub fn store(&self) -> &CacheStore<Vec<u8>> {
        &self.store
    }
}

/// Run `attempt`, retrying retryable failures up to `retries` more times.
///
/// Waits `100ms * 2^n` before retry `n + 1`. Errors for which
/// [`Error::is_retryable`](crate::Error::is_retryable) is false are returned
/// at once.
///
/// # Errors
///
/// The last error once retries are exhausted, or the first non-retryable one.
pub async fn retry_with_backoff<T, F, Fut>(retries: u32, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = retries + 1;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempts >= max_attempts || !e.is_retryable() {
                    return Err(e);
                }

                let delay = BASE_BACKOFF * 2_u32.pow(attempts - 1);
                debug!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempts, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
