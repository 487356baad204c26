//! Hotel search service.
//!
//! Ties the pieces together: a shared [`ClientPool`], an optional response
//! cache, a [`MetricsRecorder`] and a [`FanOutExecutor`] for batch searches.
//! Every upstream call is bounded by the configured timeout and retried with
//! exponential backoff on retryable failures.
//!
//! ```
//! use hotel_kit::{HotelSearchService, HotelsConfig};
//! use hotel_kit::models::HotelsListRequest;
//! use hotel_kit::upstream::{StaticClientFactory, StaticHotelsApi};
//!
//! # async fn example() -> hotel_kit::Result<()> {
//! let factory = StaticClientFactory::new(StaticHotelsApi::new());
//! let service = HotelSearchService::new(factory, HotelsConfig::default())?;
//!
//! let hotels = service
//!     .search_hotels_by_location(&HotelsListRequest::new(48.8566, 2.3522))
//!     .await?;
//! println!("{} hotels", hotels.data.len());
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::config::HotelsConfig;
use crate::error::{Error, Result};
use crate::expander::{retry_with_backoff, CacheExpander, CacheStats};
use crate::fanout::FanOutExecutor;
use crate::models::{
    HotelOffersRequest, HotelOffersResponse, HotelsListRequest, HotelsListResponse, Location,
    LocationSearch,
};
use crate::observability::{MetricsRecorder, MetricsSummary};
use crate::pool::{ClientPool, PoolStats};
use crate::store::CacheStore;
use crate::upstream::{ClientFactory, HotelsApi};

/// Tracked operation names.
pub const SEARCH_HOTELS_BY_LOCATION: &str = "search_hotels_by_location";
pub const SEARCH_HOTEL_OFFERS: &str = "search_hotel_offers";
pub const SEARCH_HOTELS_BY_MULTIPLE_LOCATIONS: &str = "search_hotels_by_multiple_locations";
pub const SEARCH_HOTEL_OFFERS_BATCH: &str = "search_hotel_offers_batch";

/// Cache namespaces.
pub const HOTELS_BY_LOCATION: &str = "hotels_by_location";
pub const HOTEL_OFFERS: &str = "hotel_offers";

/// Cache report returned by [`HotelSearchService::cache_report`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub cache_enabled: bool,
    pub statistics: Option<CacheStats>,
    pub hit_rate_percentage: f64,
}

/// Hotel search front end over a pool of upstream handles.
pub struct HotelSearchService<F: ClientFactory> {
    config: HotelsConfig,
    executor: FanOutExecutor<F>,
    cache: Option<CacheExpander>,
    recorder: Arc<MetricsRecorder>,
}

impl<F: ClientFactory> HotelSearchService<F> {
    /// Build the pool, cache and recorder described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if `config` fails validation.
    pub fn new(factory: F, config: HotelsConfig) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(ClientPool::new(factory, config.pool_size));
        let recorder = Arc::new(MetricsRecorder::new(config.metrics_history_capacity));

        let mut executor = FanOutExecutor::new(pool, Arc::clone(&recorder));
        if let Some(limit) = config.max_concurrent_requests {
            executor = executor.with_max_concurrency(limit);
        }

        let cache = if config.enable_caching {
            Some(CacheExpander::new(CacheStore::new(
                config.cache_max_size,
                config.cache_default_ttl,
            )))
        } else {
            info!("Response caching disabled");
            None
        };

        info!(
            "✓ Hotel search service ready ({:?} environment)",
            config.credentials.environment()
        );

        Ok(HotelSearchService {
            config,
            executor,
            cache,
            recorder,
        })
    }

    fn pool(&self) -> &ClientPool<F> {
        self.executor.pool()
    }

    async fn with_timeout<T, Fut>(&self, operation: &str, future: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.api_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not complete within {:?}",
                operation, self.config.api_timeout
            ))),
        }
    }

    async fn fetch_hotels(&self, request: &HotelsListRequest) -> Result<HotelsListResponse> {
        retry_with_backoff(self.config.max_retries, || async move {
            let client = self.pool().acquire()?;
            self.with_timeout(HOTELS_BY_LOCATION, client.hotels_by_geocode(request))
                .await
        })
        .await
    }

    async fn fetch_offers(&self, request: &HotelOffersRequest) -> Result<HotelOffersResponse> {
        retry_with_backoff(self.config.max_retries, || async move {
            let client = self.pool().acquire()?;
            self.with_timeout(HOTEL_OFFERS, client.hotel_offers(request))
                .await
        })
        .await
    }

    /// Hotels around one point. Cached when caching is enabled.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` for a malformed request, otherwise the
    /// upstream error after retries.
    pub async fn search_hotels_by_location(
        &self,
        request: &HotelsListRequest,
    ) -> Result<HotelsListResponse> {
        self.recorder
            .instrument(SEARCH_HOTELS_BY_LOCATION, async {
                request.validate()?;
                match &self.cache {
                    Some(cache) => {
                        cache
                            .get_or_compute(HOTELS_BY_LOCATION, request, None, || {
                                self.fetch_hotels(request)
                            })
                            .await
                    }
                    None => self.fetch_hotels(request).await,
                }
            })
            .await
    }

    /// Offers for a set of hotels. Cached when caching is enabled.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` for a malformed request, otherwise the
    /// upstream error after retries.
    pub async fn search_hotel_offers(
        &self,
        request: &HotelOffersRequest,
    ) -> Result<HotelOffersResponse> {
        self.recorder
            .instrument(SEARCH_HOTEL_OFFERS, async {
                request.validate()?;
                match &self.cache {
                    Some(cache) => {
                        cache
                            .get_or_compute(HOTEL_OFFERS, request, None, || {
                                self.fetch_offers(request)
                            })
                            .await
                    }
                    None => self.fetch_offers(request).await,
                }
            })
            .await
    }

    /// Search around several points at once.
    ///
    /// Returns one response per location, in location order. A location
    /// whose search fails yields an empty response. Each location is
    /// tracked as its own operation.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` if no location is given or any expanded
    /// request is invalid. Upstream failures never fail the whole call.
    pub async fn search_hotels_by_multiple_locations(
        &self,
        locations: &[Location],
        search: &LocationSearch,
    ) -> Result<Vec<HotelsListResponse>> {
        if locations.is_empty() {
            return Err(Error::ValidationError(
                "At least one location is required".to_string(),
            ));
        }

        let requests = search.requests_for(locations);
        for (index, request) in requests.iter().enumerate() {
            request
                .validate()
                .map_err(|e| Error::ValidationError(format!("Location {}: {}", index, e)))?;
        }

        let max_retries = self.config.max_retries;
        let responses = self
            .executor
            .execute_batch_or_empty(
                SEARCH_HOTELS_BY_MULTIPLE_LOCATIONS,
                &requests,
                |client, request| async move {
                    let api: &F::Client = &client;
                    retry_with_backoff(max_retries, || {
                        self.with_timeout(HOTELS_BY_LOCATION, api.hotels_by_geocode(request))
                    })
                    .await
                },
            )
            .await;

        Ok(responses)
    }

    /// Run several offer searches at once.
    ///
    /// Same contract as
    /// [`search_hotels_by_multiple_locations`](Self::search_hotels_by_multiple_locations):
    /// order preserved, failed slots empty.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` if no request is given or any request is
    /// invalid.
    pub async fn search_hotel_offers_batch(
        &self,
        requests: &[HotelOffersRequest],
    ) -> Result<Vec<HotelOffersResponse>> {
        if requests.is_empty() {
            return Err(Error::ValidationError(
                "At least one hotel offer request is required".to_string(),
            ));
        }
        for (index, request) in requests.iter().enumerate() {
            request
                .validate()
                .map_err(|e| Error::ValidationError(format!("Request {}: {}", index, e)))?;
        }

        let max_retries = self.config.max_retries;
        let responses = self
            .executor
            .execute_batch_or_empty(
                SEARCH_HOTEL_OFFERS_BATCH,
                requests,
                |client, request| async move {
                    let api: &F::Client = &client;
                    retry_with_backoff(max_retries, || {
                        self.with_timeout(HOTEL_OFFERS, api.hotel_offers(request))
                    })
                    .await
                },
            )
            .await;

        Ok(responses)
    }

    /// Check the upstream with one pooled handle. Failures are logged and
    /// reported as `false`.
    pub async fn health_check(&self) -> bool {
        let result = match self.pool().acquire() {
            Ok(client) => self.with_timeout("health_check", client.health_check()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(healthy) => healthy,
            Err(e) => {
                error!("Health check failed: {}", e);
                false
            }
        }
    }

    /// `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(CacheExpander::stats)
    }

    pub fn cache_report(&self) -> CacheReport {
        let statistics = self.cache_stats();
        let hit_rate_percentage = statistics
            .as_ref()
            .map(|s| (s.hit_rate * 10_000.0).round() / 100.0)
            .unwrap_or(0.0);

        CacheReport {
            cache_enabled: statistics.is_some(),
            statistics,
            hit_rate_percentage,
        }
    }

    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the report cannot be encoded.
    pub fn cache_report_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.cache_report())?)
    }

    /// Drop every cached response. Returns `false` when caching is disabled.
    pub fn clear_cache(&self) -> bool {
        match &self.cache {
            Some(cache) => {
                cache.clear();
                true
            }
            None => false,
        }
    }

    /// Remove the cached responses of one operation namespace.
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        self.cache
            .as_ref()
            .map(|cache| cache.invalidate_operation(operation))
            .unwrap_or(0)
    }

    pub fn performance_summary(&self) -> MetricsSummary {
        self.recorder.summary()
    }

    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the summary cannot be encoded.
    pub fn performance_summary_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.performance_summary())?)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool().stats()
    }

    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }

    pub fn config(&self) -> &HotelsConfig {
        &self.config
    }

    /// Wait for borrowed handles to return and release the pool. Later
    /// searches fail with `Error::PoolShutdown`.
    pub async fn shutdown(&self) {
        self.pool().shutdown().await;
        info!("✓ Hotel search service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoCode, Hotel};
    use crate::upstream::{StaticClientFactory, StaticHotelsApi};
    use std::time::Duration;

    fn hotel_at(id: &str, latitude: f64, longitude: f64) -> Hotel {
        Hotel {
            chain_code: Some("HL".to_string()),
            iata_code: None,
            dupe_id: None,
            name: id.to_string(),
            hotel_id: id.to_string(),
            geo_code: GeoCode {
                latitude,
                longitude,
            },
            address: None,
            distance: None,
        }
    }

    fn config() -> HotelsConfig {
        HotelsConfig {
            max_retries: 1,
            pool_size: 2,
            ..HotelsConfig::default()
        }
    }

    fn service(
        api: StaticHotelsApi,
        config: HotelsConfig,
    ) -> HotelSearchService<StaticClientFactory> {
        HotelSearchService::new(StaticClientFactory::new(api), config).unwrap()
    }

    #[tokio::test]
    async fn test_second_search_is_served_from_cache() {
        let api = StaticHotelsApi::new();
        api.add_hotel(hotel_at("HLPAR266", 48.8566, 2.3522));
        let service = service(api.clone(), config());
        let request = HotelsListRequest::new(48.8566, 2.3522);

        let first = service.search_hotels_by_location(&request).await.unwrap();
        let second = service.search_hotels_by_location(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.calls(), 1);
        let stats = service.cache_stats().unwrap();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);

        let summary = service.performance_summary();
        assert_eq!(summary.operation_types[SEARCH_HOTELS_BY_LOCATION], 2);
    }

    #[tokio::test]
    async fn test_caching_disabled_always_calls_upstream() {
        let api = StaticHotelsApi::new();
        let service = service(
            api.clone(),
            HotelsConfig {
                enable_caching: false,
                ..config()
            },
        );
        let request = HotelsListRequest::new(48.8566, 2.3522);

        service.search_hotels_by_location(&request).await.unwrap();
        service.search_hotels_by_location(&request).await.unwrap();

        assert_eq!(api.calls(), 2);
        assert!(service.cache_stats().is_none());
        assert!(!service.clear_cache());
        assert!(!service.cache_report().cache_enabled);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_upstream() {
        let api = StaticHotelsApi::new();
        let service = service(api.clone(), config());

        let result = service
            .search_hotels_by_location(&HotelsListRequest::new(120.0, 0.0))
            .await;

        assert!(matches!(result, Err(Error::ValidationError(_))));
        assert_eq!(api.calls(), 0);
        let stats = service.recorder().stats(Some(SEARCH_HOTELS_BY_LOCATION));
        assert_eq!(stats.failed_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_is_retried_then_returned() {
        let api = StaticHotelsApi::new();
        api.fail_location(10.0, 10.0);
        let service = service(api.clone(), config());

        let result = service
            .search_hotels_by_location(&HotelsListRequest::new(10.0, 10.0))
            .await;

        assert!(matches!(result, Err(Error::Upstream { .. })));
        // first attempt + one retry
        assert_eq!(api.calls(), 2);
        assert_eq!(service.cache_stats().unwrap().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upstream_times_out() {
        let api = StaticHotelsApi::new().with_latency(Duration::from_secs(5));
        let service = service(
            api,
            HotelsConfig {
                api_timeout: Duration::from_secs(1),
                max_retries: 0,
                ..config()
            },
        );

        let result = service
            .search_hotels_by_location(&HotelsListRequest::new(0.0, 0.0))
            .await;

        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(service.pool_stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_multiple_locations_keep_order_and_fill_failures() {
        let api = StaticHotelsApi::new();
        api.add_hotel(hotel_at("A", 1.0, 1.0));
        api.add_hotel(hotel_at("C", 3.0, 3.0));
        api.fail_location(2.0, 2.0);
        let service = service(
            api,
            HotelsConfig {
                max_retries: 0,
                ..config()
            },
        );

        let locations: Vec<Location> = (1..=3)
            .map(|i| Location {
                latitude: f64::from(i),
                longitude: f64::from(i),
            })
            .collect();
        let responses = service
            .search_hotels_by_multiple_locations(&locations, &LocationSearch::default())
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].data[0].hotel_id, "A");
        assert!(responses[1].data.is_empty());
        assert_eq!(responses[2].data[0].hotel_id, "C");

        let stats = service
            .recorder()
            .stats(Some(SEARCH_HOTELS_BY_MULTIPLE_LOCATIONS));
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.failed_operations, 1);
    }

    #[tokio::test]
    async fn test_batch_validation() {
        let service = service(StaticHotelsApi::new(), config());

        assert!(matches!(
            service
                .search_hotels_by_multiple_locations(&[], &LocationSearch::default())
                .await,
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            service.search_hotel_offers_batch(&[]).await,
            Err(Error::ValidationError(_))
        ));

        let reversed =
            HotelOffersRequest::new(vec!["MCLONGHM".to_string()], "2026-11-03", "2026-11-01");
        assert!(matches!(
            service.search_hotel_offers_batch(&[reversed]).await,
            Err(Error::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_health_check_and_shutdown() {
        let api = StaticHotelsApi::new();
        let service = service(api, config());
        assert!(service.health_check().await);

        service.shutdown().await;

        assert!(!service.health_check().await);
        assert!(matches!(
            service
                .search_hotels_by_location(&HotelsListRequest::new(0.0, 0.0))
                .await,
            Err(Error::PoolShutdown)
        ));
    }

    #[tokio::test]
    async fn test_json_snapshots() {
        let service = service(StaticHotelsApi::new(), config());
        service
            .search_hotels_by_location(&HotelsListRequest::new(0.0, 0.0))
            .await
            .unwrap();

        let cache: serde_json::Value =
            serde_json::from_str(&service.cache_report_json().unwrap()).unwrap();
        assert_eq!(cache["cache_enabled"], true);
        assert_eq!(cache["statistics"]["miss_count"], 1);

        let perf: serde_json::Value =
            serde_json::from_str(&service.performance_summary_json().unwrap()).unwrap();
        assert_eq!(perf["total_operations"], 1);
        assert_eq!(perf["operation_types"][SEARCH_HOTELS_BY_LOCATION], 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = HotelSearchService::new(
            StaticClientFactory::new(StaticHotelsApi::new()),
            HotelsConfig {
                pool_size: 0,
                ..HotelsConfig::default()
            },
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
