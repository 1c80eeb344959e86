//! Rate query orchestration.
//!
//! Every flow has the same shape: validate the request, try the cache, fall
//! back to the authoritative source (ban store or rate provider), write the
//! fresh value back to the cache and answer. Only the write-back is allowed
//! to fail quietly; everything else aborts the request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use ratekeeper_common::{
    constants, Clock, CurrencyCode, CurrencyRate, CurrencyRegistry, CurrencyTimelineRate,
    CurrencyWithBanStatus, RateDate, RateError, Result, SystemClock,
};
use ratekeeper_fx::{Forecaster, RateCache, RateProvider};
use ratekeeper_store::BanStore;

use crate::metrics::{Metrics, SharedMetrics};

/// Time budget for each dependency.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub cache: Duration,
    pub store: Duration,
    pub provider: Duration,
    pub forecast: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            cache: Duration::from_millis(500),
            store: Duration::from_millis(3000),
            provider: Duration::from_millis(5000),
            forecast: constants::FORECAST_TIMEOUT,
        }
    }
}

/// Run `fut` within `limit`, tagging any failure with `operation`.
///
/// Dropping the future on expiry cancels the in-flight call.
pub async fn bounded<T, E, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<RateError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(|e| e.into().context(operation)),
        Err(_) => Err(RateError::Timeout(format!(
            "{operation} exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

/// The query orchestrator.
pub struct RateService {
    cache: Arc<dyn RateCache>,
    store: Arc<dyn BanStore>,
    provider: Arc<dyn RateProvider>,
    forecaster: Option<Arc<dyn Forecaster>>,
    registry: CurrencyRegistry,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    metrics: SharedMetrics,
}

impl RateService {
    /// Create a service with the standard registry, the system clock and no
    /// forecaster.
    pub fn new(
        cache: Arc<dyn RateCache>,
        store: Arc<dyn BanStore>,
        provider: Arc<dyn RateProvider>,
    ) -> Self {
        Self {
            cache,
            store,
            provider,
            forecaster: None,
            registry: CurrencyRegistry::standard(),
            clock: Arc::new(SystemClock),
            timeouts: Timeouts::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_forecaster(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.forecaster = Some(forecaster);
        self
    }

    pub fn with_registry(mut self, registry: CurrencyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get the metrics handle.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Get the currency registry.
    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    /// Log and count a failed side operation without propagating it.
    fn best_effort(&self, operation: &str, result: Result<()>) {
        if let Err(e) = result {
            self.metrics.best_effort_failure();
            warn!(operation, error = %e, "Best-effort cache operation failed");
        }
    }

    fn today(&self) -> RateDate {
        RateDate::from_naive(self.clock.today())
    }

    /// Every registry currency with its ban flag, banned first and then by
    /// code.
    #[instrument(skip(self))]
    pub async fn available_currencies(&self) -> Result<Vec<CurrencyWithBanStatus>> {
        let cached = bounded(
            self.timeouts.cache,
            "get available currencies",
            self.cache.get_available_currencies(),
        )
        .await?;

        if let Some(currencies) = cached {
            self.metrics.cache_hit();
            debug!(count = currencies.len(), "Availability served from cache");
            return Ok(currencies);
        }
        self.metrics.cache_miss();

        let codes: Vec<CurrencyCode> = self.registry.all_codes().cloned().collect();
        let rows = bounded(self.timeouts.store, "list bans", self.store.list_bans(&codes)).await?;
        let overrides: HashMap<CurrencyCode, bool> =
            rows.into_iter().map(|row| (row.currency, row.banned)).collect();

        let mut currencies: Vec<CurrencyWithBanStatus> = codes
            .into_iter()
            .map(|code| {
                let banned = overrides.get(&code).copied().unwrap_or(false);
                CurrencyWithBanStatus::new(code, banned)
            })
            .collect();
        currencies.sort_by(CurrencyWithBanStatus::availability_order);

        let written = bounded(
            self.timeouts.cache,
            "set available currencies",
            self.cache.set_available_currencies(&currencies),
        )
        .await;
        self.best_effort("set available currencies", written);

        Ok(currencies)
    }

    /// Set the ban flag of one currency.
    #[instrument(skip(self))]
    pub async fn change_ban_status(&self, currency: &str, banned: bool) -> Result<()> {
        let code = self.registry.validate("currency", currency)?;

        bounded(
            self.timeouts.store,
            "upsert ban",
            self.store.upsert_ban(&code, banned),
        )
        .await?;
        info!(currency = %code, banned, "Ban status changed");

        let invalidated = bounded(
            self.timeouts.cache,
            "invalidate available currencies",
            self.cache.invalidate_available_currencies(),
        )
        .await;
        self.best_effort("invalidate available currencies", invalidated);

        Ok(())
    }

    /// Latest known rate of `second` against `base`.
    ///
    /// A cached rate is served while its date is not after today; otherwise
    /// yesterday's snapshot is fetched, since the provider does not reliably
    /// publish the current day.
    #[instrument(skip(self))]
    pub async fn current_rate(&self, base: &str, second: &str) -> Result<CurrencyRate> {
        let base = self.registry.validate("base", base)?;
        let second = self.registry.validate("second", second)?;
        let today = self.today();

        let cached = bounded(
            self.timeouts.cache,
            "get last rate",
            self.cache.get_last_rate(&base, &second),
        )
        .await?;

        match cached {
            Some(rate) if rate.date.is_set() && rate.date <= today => {
                self.metrics.cache_hit();
                debug!(date = %rate.date, "Rate served from cache");
                return Ok(rate);
            }
            Some(rate) => debug!(date = %rate.date, "Cached rate not usable"),
            None => {}
        }
        self.metrics.cache_miss();

        let yesterday = today.add_days(-1);
        self.metrics.upstream_fetch();
        let snapshot = bounded(
            self.timeouts.provider,
            "fetch snapshot",
            self.provider.fetch_snapshot(&base, yesterday),
        )
        .await?;

        let rate = snapshot
            .rate_for(&second)
            .ok_or_else(|| RateError::RateNotFound {
                base: base.clone(),
                second: second.clone(),
            })?;

        let written = bounded(
            self.timeouts.cache,
            "set last rates",
            self.cache.set_last_rates(&snapshot),
        )
        .await;
        self.best_effort("set last rates", written);

        Ok(rate)
    }

    /// Daily rates of a pair restricted to `[start, end]`, plus predictions.
    ///
    /// The stored series always covers the year up to yesterday; `start` and
    /// `end` only select the part returned.
    #[instrument(skip(self))]
    pub async fn timeline_rate(
        &self,
        base: &str,
        second: &str,
        start: &str,
        end: &str,
    ) -> Result<CurrencyTimelineRate> {
        let base = self.registry.validate("base", base)?;
        let second = self.registry.validate("second", second)?;
        let start = parse_period_date("start", start)?;
        let end = parse_period_date("end", end)?;
        if start > end {
            return Err(RateError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let cached = bounded(
            self.timeouts.cache,
            "get timeline",
            self.cache.get_timeline(&base, &second),
        )
        .await?;

        let timeline = match cached {
            Some(timeline) => {
                self.metrics.cache_hit();
                debug!(days = timeline.rates.len(), "Timeline served from cache");
                timeline
            }
            None => {
                self.metrics.cache_miss();
                let timeline = self.fresh_timeline(&base, &second).await?;

                let written = bounded(
                    self.timeouts.cache,
                    "set timeline",
                    self.cache.set_timeline(&timeline),
                )
                .await;
                self.best_effort("set timeline", written);

                timeline
            }
        };

        Ok(timeline.window(start, end))
    }

    /// Fetch the one-year lookback and attach predictions when a forecaster
    /// is configured.
    async fn fresh_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
    ) -> Result<CurrencyTimelineRate> {
        let yesterday = self.today().add_days(-1);
        let from = yesterday.months_before(constants::TIMELINE_LOOKBACK_MONTHS);

        self.metrics.upstream_fetch();
        let timeline = bounded(
            self.timeouts.provider,
            "fetch timeline",
            self.provider.fetch_timeline(base, second, from, yesterday),
        )
        .await?;

        let Some(forecaster) = &self.forecaster else {
            return Ok(timeline);
        };

        self.metrics.forecast_call();
        let predicted = bounded(
            self.timeouts.forecast,
            "forecast timeline",
            forecaster.predict(&timeline.rates),
        )
        .await?;
        debug!(points = predicted.len(), "Predictions attached");

        Ok(timeline.with_predictions(yesterday.add_days(1), &predicted))
    }
}

fn parse_period_date(field: &'static str, raw: &str) -> Result<RateDate> {
    RateDate::parse_canonical(raw).map_err(|_| RateError::InvalidDate {
        field,
        value: raw.to_string(),
    })
}
