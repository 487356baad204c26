//! # hotel-kit
//!
//! Concurrency and caching layer for a hotel search service backed by a
//! rate-limited remote API.
//!
//! ## Features
//!
//! - **Response cache:** bounded LRU store with per-entry TTL, keyed by a
//!   fingerprint of operation name and request parameters
//! - **Cache-aside:** [`CacheExpander::get_or_compute`] runs the upstream call
//!   only on a miss and never caches failures
//! - **Client pool:** reusable upstream handles with overflow under bursts
//!   and graceful shutdown
//! - **Fan-out:** batches of independent calls run concurrently, results keep
//!   input order, one failure never affects the others
//! - **Metrics:** start/end tracking of named operations with duration
//!   percentiles, concurrency, error rate and throughput
//!
//! ## Quick Start
//!
//! ```
//! use hotel_kit::{HotelSearchService, HotelsConfig};
//! use hotel_kit::models::{HotelsListRequest, Location, LocationSearch};
//! use hotel_kit::upstream::{StaticClientFactory, StaticHotelsApi};
//!
//! # async fn example() -> hotel_kit::Result<()> {
//! // Any `ClientFactory` works; the static one answers from memory.
//! let factory = StaticClientFactory::new(StaticHotelsApi::new());
//! let service = HotelSearchService::new(factory, HotelsConfig::default())?;
//!
//! // Single search, cached
//! let paris = service
//!     .search_hotels_by_location(&HotelsListRequest::new(48.8566, 2.3522))
//!     .await?;
//!
//! // Several searches at once, one response per location
//! let all = service
//!     .search_hotels_by_multiple_locations(
//!         &[
//!             Location {
//!                 latitude: 48.8566,
//!                 longitude: 2.3522,
//!             },
//!             Location {
//!                 latitude: 51.5074,
//!                 longitude: -0.1278,
//!             },
//!         ],
//!         &LocationSearch::default(),
//!     )
//!     .await?;
//! assert_eq!(all.len(), 2);
//!
//! println!("{}", service.performance_summary_json()?);
//! service.shutdown().await;
//! # let _ = paris;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod expander;
pub mod fanout;
pub mod key;
pub mod models;
pub mod observability;
pub mod pool;
pub mod serialization;
pub mod service;
pub mod store;
pub mod upstream;

// Re-exports for convenience
pub use config::HotelsConfig;
pub use error::{Error, Result};
pub use expander::{CacheExpander, CacheStats, OperationConfig};
pub use fanout::{BatchSlot, FanOutExecutor};
pub use observability::{MetricsRecorder, TtlPolicy};
pub use pool::{ClientPool, PooledClient};
pub use service::HotelSearchService;
pub use store::CacheStore;
pub use upstream::{ClientFactory, HotelsApi};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
