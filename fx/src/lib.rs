//! Ratekeeper FX
//!
//! Rate storage and upstream access for the currency-rate service.
//!
//! # Features
//!
//! - Cache-aside storage for availability lists, last snapshots and timelines
//! - Redis and in-memory cache backends behind one trait
//! - HTTP client for the upstream exchange-rate provider
//! - Optional forecast client extending timelines with predicted points
//!
//! # Example
//!
//! ```rust,ignore
//! use ratekeeper_fx::{ExchangerClient, ExchangerConfig, RateProvider};
//! use ratekeeper_common::{CurrencyCode, RateDate};
//!
//! let client = ExchangerClient::new(ExchangerConfig::default())?;
//! let snapshot = client
//!     .fetch_snapshot(&CurrencyCode::new("USD"), RateDate::parse("2024-01-01")?)
//!     .await?;
//! ```

pub mod cache;
pub mod error;
pub mod forecast;
pub mod provider;
pub mod redis_cache;

pub use cache::{cache_keys, MemoryRateCache, RateCache};
pub use error::{CacheError, CacheResult, ProviderError, ProviderResult};
pub use forecast::{Forecaster, HttpForecaster};
pub use provider::{ExchangerClient, ExchangerConfig, RateProvider};
pub use redis_cache::RedisRateCache;

#[cfg(any(test, feature = "test-utils"))]
pub use cache::MockRateCache;
#[cfg(any(test, feature = "test-utils"))]
pub use forecast::MockForecaster;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
