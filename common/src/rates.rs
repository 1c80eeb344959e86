//! Rate models shared by the cache, the provider client and the service.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::currency::CurrencyCode;
use crate::time::RateDate;

/// Date-indexed rate values, ascending by date.
pub type RateSeries = BTreeMap<RateDate, f64>;

/// Currency together with its ban flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyWithBanStatus {
    pub currency: CurrencyCode,
    pub banned: bool,
}

impl CurrencyWithBanStatus {
    /// Create a new status entry.
    pub fn new(currency: CurrencyCode, banned: bool) -> Self {
        Self { currency, banned }
    }

    /// Availability ordering: banned currencies first, then by code.
    pub fn availability_order(a: &Self, b: &Self) -> Ordering {
        b.banned
            .cmp(&a.banned)
            .then_with(|| a.currency.cmp(&b.currency))
    }
}

/// Single point-in-time conversion rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub base: CurrencyCode,
    pub second: CurrencyCode,
    pub rate: f64,
    pub date: RateDate,
}

/// One upstream snapshot: a base currency against many targets on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRates {
    pub base: CurrencyCode,
    pub rates: HashMap<CurrencyCode, f64>,
    pub date: RateDate,
}

impl CurrencyRates {
    /// Project a single target out of the snapshot.
    ///
    /// Returns `None` when the provider did not quote `second`.
    pub fn rate_for(&self, second: &CurrencyCode) -> Option<CurrencyRate> {
        self.rates.get(second).map(|rate| CurrencyRate {
            base: self.base.clone(),
            second: second.clone(),
            rate: *rate,
            date: self.date,
        })
    }
}

/// Daily rates for one currency pair, optionally with forecasted points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyTimelineRate {
    pub base: CurrencyCode,
    pub second: CurrencyCode,
    pub rates: RateSeries,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub predictions: RateSeries,
    pub start_date: RateDate,
    pub end_date: RateDate,
}

impl CurrencyTimelineRate {
    /// Restrict the rate series to `[start, end]` inclusive.
    ///
    /// Predictions are carried over untouched and the period is replaced by
    /// the requested one.
    pub fn window(&self, start: RateDate, end: RateDate) -> Self {
        let rates = if start <= end {
            self.rates
                .range(start..=end)
                .map(|(date, rate)| (*date, *rate))
                .collect()
        } else {
            RateSeries::new()
        };

        Self {
            base: self.base.clone(),
            second: self.second.clone(),
            rates,
            predictions: self.predictions.clone(),
            start_date: start,
            end_date: end,
        }
    }

    /// Attach forecasted values, the first one landing on `first_day`.
    pub fn with_predictions(mut self, first_day: RateDate, values: &[f64]) -> Self {
        self.predictions = values
            .iter()
            .enumerate()
            .map(|(i, value)| (first_day.add_days(i as i64), *value))
            .collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> RateDate {
        RateDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn test_availability_order() {
        let mut list = vec![
            CurrencyWithBanStatus::new("USD".into(), false),
            CurrencyWithBanStatus::new("GBP".into(), true),
            CurrencyWithBanStatus::new("AUD".into(), false),
            CurrencyWithBanStatus::new("EUR".into(), true),
        ];
        list.sort_by(CurrencyWithBanStatus::availability_order);

        let codes: Vec<&str> = list.iter().map(|c| c.currency.as_str()).collect();
        assert_eq!(codes, vec!["EUR", "GBP", "AUD", "USD"]);
    }

    #[test]
    fn test_rate_for_projects_target() {
        let snapshot = CurrencyRates {
            base: "USD".into(),
            rates: HashMap::from([("EUR".into(), 0.92), ("GBP".into(), 0.79)]),
            date: date(2024, 1, 1),
        };

        let rate = snapshot.rate_for(&"EUR".into()).unwrap();
        assert_eq!(rate.base.as_str(), "USD");
        assert_eq!(rate.second.as_str(), "EUR");
        assert_eq!(rate.rate, 0.92);
        assert_eq!(rate.date, date(2024, 1, 1));

        assert!(snapshot.rate_for(&"RUB".into()).is_none());
    }

    #[test]
    fn test_window_is_inclusive_and_keeps_predictions() {
        let rates: RateSeries = (1..=31).map(|d| (date(2024, 1, d), d as f64)).collect();
        let timeline = CurrencyTimelineRate {
            base: "USD".into(),
            second: "EUR".into(),
            rates,
            predictions: RateSeries::from([(date(2024, 2, 1), 99.0), (date(2024, 2, 2), 100.0)]),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 31),
        };

        let window = timeline.window(date(2024, 1, 10), date(2024, 1, 20));

        assert_eq!(window.rates.len(), 11);
        assert_eq!(window.rates.keys().next(), Some(&date(2024, 1, 10)));
        assert_eq!(window.rates.keys().last(), Some(&date(2024, 1, 20)));
        assert_eq!(window.predictions, timeline.predictions);
        assert_eq!(window.start_date, date(2024, 1, 10));
        assert_eq!(window.end_date, date(2024, 1, 20));
    }

    #[test]
    fn test_with_predictions_assigns_consecutive_days() {
        let timeline = CurrencyTimelineRate {
            base: "USD".into(),
            second: "EUR".into(),
            rates: RateSeries::new(),
            predictions: RateSeries::new(),
            start_date: RateDate::UNSET,
            end_date: RateDate::UNSET,
        }
        .with_predictions(date(2024, 1, 31), &[1.0, 2.0, 3.0]);

        assert_eq!(
            timeline.predictions,
            RateSeries::from([
                (date(2024, 1, 31), 1.0),
                (date(2024, 2, 1), 2.0),
                (date(2024, 2, 2), 3.0),
            ])
        );
    }

    #[test]
    fn test_timeline_json_layout() {
        let timeline = CurrencyTimelineRate {
            base: "USD".into(),
            second: "EUR".into(),
            rates: RateSeries::from([(date(2024, 1, 1), 0.9)]),
            predictions: RateSeries::new(),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 1),
        };

        let value = serde_json::to_value(&timeline).unwrap();
        assert_eq!(value["startDate"], "2024-01-01");
        assert_eq!(value["rates"]["2024-01-01"], 0.9);
        assert!(value.get("predictions").is_none());

        let back: CurrencyTimelineRate = serde_json::from_value(value).unwrap();
        assert_eq!(back, timeline);
    }
}
