//! Redis cache backend.

use async_trait::async_trait;
use ratekeeper_common::{
    constants, CurrencyCode, CurrencyRate, CurrencyRates, CurrencyTimelineRate,
    CurrencyWithBanStatus,
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::cache::{cache_keys, decode, encode, RateCache};
use crate::error::{CacheError, CacheResult};

/// Rate cache backed by a Redis server.
///
/// The availability list is a plain key with a TTL; snapshots and timelines
/// live in two hashes. Writes Redis acknowledges without effect are
/// reported as [`CacheError::NotWritten`].
#[derive(Clone)]
pub struct RedisRateCache {
    conn: ConnectionManager,
    availability_ttl: Duration,
}

impl RedisRateCache {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        Self::connect_with_ttl(url, constants::AVAILABILITY_TTL).await
    }

    /// Connect with a custom availability TTL.
    pub async fn connect_with_ttl(url: &str, availability_ttl: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(url, reply = %pong, "Connected to Redis");

        Ok(Self {
            conn,
            availability_ttl,
        })
    }

    async fn hget(&self, collection: &str, field: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.hget(collection, field).await?;
        Ok(payload)
    }

    async fn hset(&self, collection: &str, field: &str, payload: String) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.hset(collection, field, payload).await?;
        if added == 0 {
            return Err(CacheError::NotWritten(format!("{collection}/{field}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RateCache for RedisRateCache {
    #[instrument(skip(self))]
    async fn get_available_currencies(&self) -> CacheResult<Option<Vec<CurrencyWithBanStatus>>> {
        let key = cache_keys::AVAILABLE_CURRENCIES;
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(key).await?;

        debug!(hit = payload.is_some(), "Availability lookup");
        payload.map(|p| decode(key, &p)).transpose()
    }

    #[instrument(skip(self, currencies), fields(count = currencies.len()))]
    async fn set_available_currencies(&self, currencies: &[CurrencyWithBanStatus]) -> CacheResult<()> {
        let key = cache_keys::AVAILABLE_CURRENCIES;
        let payload = encode(key, currencies)?;
        let mut conn = self.conn.clone();

        let saved: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(self.availability_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        match saved.as_deref() {
            Some("OK") => Ok(()),
            _ => Err(CacheError::NotWritten(key.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn invalidate_available_currencies(&self) -> CacheResult<()> {
        let key = cache_keys::AVAILABLE_CURRENCIES;
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;

        if removed == 0 {
            return Err(CacheError::NotWritten(key.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(base = %base, second = %second))]
    async fn get_last_rate(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyRate>> {
        let collection = cache_keys::LAST_RATE_COLLECTION;
        match self.hget(collection, base.as_str()).await? {
            Some(payload) => {
                let snapshot: CurrencyRates = decode(collection, &payload)?;
                Ok(snapshot.rate_for(second))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, snapshot), fields(base = %snapshot.base))]
    async fn set_last_rates(&self, snapshot: &CurrencyRates) -> CacheResult<()> {
        let collection = cache_keys::LAST_RATE_COLLECTION;
        let payload = encode(collection, snapshot)?;
        self.hset(collection, snapshot.base.as_str(), payload).await
    }

    #[instrument(skip(self), fields(base = %base, second = %second))]
    async fn get_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> CacheResult<Option<CurrencyTimelineRate>> {
        let collection = cache_keys::TIMELINE_COLLECTION;
        self.hget(collection, &cache_keys::timeline_field(base, second))
            .await?
            .map(|p| decode(collection, &p))
            .transpose()
    }

    #[instrument(skip(self, timeline), fields(base = %timeline.base, second = %timeline.second))]
    async fn set_timeline(&self, timeline: &CurrencyTimelineRate) -> CacheResult<()> {
        let collection = cache_keys::TIMELINE_COLLECTION;
        let payload = encode(collection, timeline)?;
        let field = cache_keys::timeline_field(&timeline.base, &timeline.second);
        self.hset(collection, &field, payload).await
    }
}
