//! Cache-aside storage for availability lists and rates.

use async_trait::async_trait;
use dashmap::DashMap;
use ratekeeper_common::{
    constants, CurrencyCode, CurrencyRate, CurrencyRates, CurrencyTimelineRate,
    CurrencyWithBanStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Key layout shared by all cache backends.
pub mod cache_keys {
    use ratekeeper_common::CurrencyCode;

    /// Plain key holding the availability list.
    pub const AVAILABLE_CURRENCIES: &str = "available";

    /// Hash of last snapshots, field = base code.
    pub const LAST_RATE_COLLECTION: &str = "rate:collection";

    /// Hash of timelines, field = `BASE:SECOND`.
    pub const TIMELINE_COLLECTION: &str = "time:collection";

    /// Timeline hash field for a pair.
    pub fn timeline_field(base: &CurrencyCode, second: &CurrencyCode) -> String {
        format!("{}:{}", base, second)
    }
}

/// Storage for derived, non-authoritative data.
///
/// `Ok(None)` means the entry is not present and the caller should fall
/// through to the authoritative source. Any `Err` is a backend or payload
/// failure and must not be mistaken for a miss.
#[async_trait]
pub trait RateCache: Send + Sync {
    /// Cached availability list.
    async fn get_available_currencies(&self) -> CacheResult<Option<Vec<CurrencyWithBanStatus>>>;

    /// Store the availability list with its TTL.
    async fn set_available_currencies(&self, currencies: &[CurrencyWithBanStatus]) -> CacheResult<()>;

    /// Drop the cached availability list.
    async fn invalidate_available_currencies(&self) -> CacheResult<()>;

    /// Last known rate for a pair, projected out of the stored snapshot.
    ///
    /// A stored snapshot that does not quote `second` counts as a miss.
    async fn get_last_rate(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyRate>>;

    /// Store a whole snapshot under its base currency.
    async fn set_last_rates(&self, snapshot: &CurrencyRates) -> CacheResult<()>;

    /// Stored timeline for a pair.
    async fn get_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyTimelineRate>>;

    /// Store a timeline under its pair key.
    async fn set_timeline(&self, timeline: &CurrencyTimelineRate) -> CacheResult<()>;
}

pub(crate) fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> CacheResult<String> {
    serde_json::to_string(value).map_err(|e| CacheError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, payload: &str) -> CacheResult<T> {
    serde_json::from_str(payload).map_err(|e| CacheError::MalformedPayload {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Cached plain value.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    cached_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn new(payload: String, ttl: Option<Duration>) -> Self {
        Self {
            payload,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_valid(&self) -> bool {
        self.ttl.map_or(true, |ttl| self.cached_at.elapsed() < ttl)
    }
}

/// In-process cache backend.
///
/// Stores JSON payloads exactly like the Redis backend so both decode the
/// same way. Plain keys honour their TTL; hash fields live until replaced.
pub struct MemoryRateCache {
    plain: DashMap<String, CacheEntry>,
    hashes: DashMap<(String, String), String>,
    availability_ttl: Duration,
}

impl MemoryRateCache {
    /// Create a cache with the default availability TTL.
    pub fn new() -> Self {
        Self::with_ttl(constants::AVAILABILITY_TTL)
    }

    /// Create a cache with a custom availability TTL.
    pub fn with_ttl(availability_ttl: Duration) -> Self {
        Self {
            plain: DashMap::new(),
            hashes: DashMap::new(),
            availability_ttl,
        }
    }

    /// Store a raw payload under a hash field, bypassing encoding.
    pub fn insert_raw(&self, collection: &str, field: &str, payload: impl Into<String>) {
        self.hashes
            .insert((collection.to_string(), field.to_string()), payload.into());
    }

    /// Number of live entries across plain keys and hash fields.
    pub fn len(&self) -> usize {
        self.plain.iter().filter(|e| e.is_valid()).count() + self.hashes.len()
    }

    /// Check if the cache holds nothing live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired plain entries.
    pub fn evict_expired(&self) {
        self.plain.retain(|_, entry| entry.is_valid());
    }

    fn get_plain(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.plain.get(key) {
            if entry.is_valid() {
                return Some(entry.payload.clone());
            }
            debug!(key, "Cache entry expired");
            drop(entry);
            self.plain.remove(key);
        }
        None
    }

    fn hget(&self, collection: &str, field: &str) -> Option<String> {
        self.hashes
            .get(&(collection.to_string(), field.to_string()))
            .map(|v| v.clone())
    }
}

impl Default for MemoryRateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateCache for MemoryRateCache {
    async fn get_available_currencies(&self) -> CacheResult<Option<Vec<CurrencyWithBanStatus>>> {
        let key = cache_keys::AVAILABLE_CURRENCIES;
        self.get_plain(key)
            .map(|payload| decode(key, &payload))
            .transpose()
    }

    async fn set_available_currencies(&self, currencies: &[CurrencyWithBanStatus]) -> CacheResult<()> {
        let key = cache_keys::AVAILABLE_CURRENCIES;
        let payload = encode(key, currencies)?;
        self.plain.insert(
            key.to_string(),
            CacheEntry::new(payload, Some(self.availability_ttl)),
        );
        Ok(())
    }

    async fn invalidate_available_currencies(&self) -> CacheResult<()> {
        let key = cache_keys::AVAILABLE_CURRENCIES;
        match self.plain.remove(key) {
            Some(_) => Ok(()),
            None => Err(CacheError::NotWritten(key.to_string())),
        }
    }

    async fn get_last_rate(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyRate>> {
        let collection = cache_keys::LAST_RATE_COLLECTION;
        match self.hget(collection, base.as_str()) {
            Some(payload) => {
                let snapshot: CurrencyRates = decode(collection, &payload)?;
                Ok(snapshot.rate_for(second))
            }
            None => Ok(None),
        }
    }

    async fn set_last_rates(&self, snapshot: &CurrencyRates) -> CacheResult<()> {
        let collection = cache_keys::LAST_RATE_COLLECTION;
        let payload = encode(collection, snapshot)?;
        self.insert_raw(collection, snapshot.base.as_str(), payload);
        Ok(())
    }

    async fn get_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyTimelineRate>> {
        let collection = cache_keys::TIMELINE_COLLECTION;
        self.hget(collection, &cache_keys::timeline_field(base, second))
            .map(|payload| decode(collection, &payload))
            .transpose()
    }

    async fn set_timeline(&self, timeline: &CurrencyTimelineRate) -> CacheResult<()> {
        let collection = cache_keys::TIMELINE_COLLECTION;
        let payload = encode(collection, timeline)?;
        let field = cache_keys::timeline_field(&timeline.base, &timeline.second);
        self.insert_raw(collection, &field, payload);
        Ok(())
    }
}

/// Recording cache for tests.
///
/// Delegates to a [`MemoryRateCache`], counts every call and can be told to
/// fail reads or writes.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateCache {
    inner: MemoryRateCache,
    reads: std::sync::atomic::AtomicUsize,
    writes: std::sync::atomic::AtomicUsize,
    invalidations: std::sync::atomic::AtomicUsize,
    fail_reads: std::sync::atomic::AtomicBool,
    fail_writes: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateCache {
    /// Create an empty mock cache.
    pub fn new() -> Self {
        Self {
            inner: MemoryRateCache::new(),
            reads: Default::default(),
            writes: Default::default(),
            invalidations: Default::default(),
            fail_reads: Default::default(),
            fail_writes: Default::default(),
        }
    }

    /// Backing store, for seeding without touching the counters.
    pub fn inner(&self) -> &MemoryRateCache {
        &self.inner
    }

    /// Make every read fail with a backend error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make every write and invalidation fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of read calls.
    pub fn reads(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of write calls.
    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of invalidation calls.
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.reads() + self.writes() + self.invalidations()
    }

    fn on_read(&self) -> CacheResult<()> {
        self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CacheError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    fn on_write(&self, counter: &std::sync::atomic::AtomicUsize) -> CacheResult<()> {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CacheError::Backend("connection refused".to_string()));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockRateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateCache for MockRateCache {
    async fn get_available_currencies(&self) -> CacheResult<Option<Vec<CurrencyWithBanStatus>>> {
        self.on_read()?;
        self.inner.get_available_currencies().await
    }

    async fn set_available_currencies(&self, currencies: &[CurrencyWithBanStatus]) -> CacheResult<()> {
        self.on_write(&self.writes)?;
        self.inner.set_available_currencies(currencies).await
    }

    async fn invalidate_available_currencies(&self) -> CacheResult<()> {
        self.on_write(&self.invalidations)?;
        self.inner.invalidate_available_currencies().await
    }

    async fn get_last_rate(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyRate>> {
        self.on_read()?;
        self.inner.get_last_rate(base, second).await
    }

    async fn set_last_rates(&self, snapshot: &CurrencyRates) -> CacheResult<()> {
        self.on_write(&self.writes)?;
        self.inner.set_last_rates(snapshot).await
    }

    async fn get_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyTimelineRate>> {
        self.on_read()?;
        self.inner.get_timeline(base, second).await
    }

    async fn set_timeline(&self, timeline: &CurrencyTimelineRate) -> CacheResult<()> {
        self.on_write(&self.writes)?;
        self.inner.set_timeline(timeline).await
    }
}
