//! Calendar dates for rate series and time utilities.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Canonical text layout of a [`RateDate`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Token emitted for an unset date.
pub const UNSET_TOKEN: &str = "null";

/// Service timing constants.
pub mod constants {
    use std::time::Duration;

    /// Lifetime of the cached availability list (24 hours).
    pub const AVAILABILITY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Default budget for a forecast call (10 minutes).
    pub const FORECAST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    /// Length of the default timeline lookback, in months.
    pub const TIMELINE_LOOKBACK_MONTHS: u32 = 12;
}

/// Date that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date '{0}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
pub struct DateParseError(pub String);

/// A calendar date, or the explicit unset sentinel.
///
/// Stored as a day number counted from the common era so that ordering,
/// equality and hashing are those of the date itself. This makes the type
/// usable as a map key in rate series. The unset sentinel orders before
/// every real date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RateDate(Option<i32>);

impl RateDate {
    /// The unset sentinel.
    pub const UNSET: RateDate = RateDate(None);

    /// Create from a chrono date.
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(Some(date.num_days_from_ce()))
    }

    /// Create from year, month and day, if that is a real date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self::from_naive)
    }

    /// Check if this holds a real date.
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// The underlying chrono date, if set.
    pub fn naive(&self) -> Option<NaiveDate> {
        self.0.and_then(NaiveDate::from_num_days_from_ce_opt)
    }

    /// Parse the canonical `YYYY-MM-DD` form, falling back to an RFC 3339
    /// timestamp (its calendar date is kept). `"null"` yields the sentinel.
    pub fn parse(text: &str) -> Result<Self, DateParseError> {
        let text = text.trim_matches('"');
        if text == UNSET_TOKEN {
            return Ok(Self::UNSET);
        }
        if let Ok(date) = Self::parse_canonical(text) {
            return Ok(date);
        }
        DateTime::parse_from_rfc3339(text)
            .map(|ts| Self::from_naive(ts.date_naive()))
            .map_err(|_| DateParseError(text.to_string()))
    }

    /// Parse the canonical `YYYY-MM-DD` form only.
    pub fn parse_canonical(text: &str) -> Result<Self, DateParseError> {
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Self::from_naive)
            .map_err(|_| DateParseError(text.to_string()))
    }

    /// Shift by a number of days. The sentinel stays unset.
    pub fn add_days(self, days: i64) -> Self {
        let shifted = self.naive().and_then(|date| {
            if days >= 0 {
                date.checked_add_days(Days::new(days.unsigned_abs()))
            } else {
                date.checked_sub_days(Days::new(days.unsigned_abs()))
            }
        });
        shifted.map(Self::from_naive).unwrap_or(Self::UNSET)
    }

    /// Same day a number of months earlier, clamped to month end.
    pub fn months_before(self, months: u32) -> Self {
        self.naive()
            .and_then(|date| date.checked_sub_months(Months::new(months)))
            .map(Self::from_naive)
            .unwrap_or(Self::UNSET)
    }

    /// Check if this date lies within `[start, end]`, both ends inclusive.
    pub fn within(&self, start: RateDate, end: RateDate) -> bool {
        self.is_set() && *self >= start && *self <= end
    }

    /// Format with a custom chrono layout; the sentinel formats as `"null"`.
    pub fn format_with(&self, layout: &str) -> String {
        match self.naive() {
            Some(date) => date.format(layout).to_string(),
            None => UNSET_TOKEN.to_string(),
        }
    }
}

impl From<NaiveDate> for RateDate {
    fn from(date: NaiveDate) -> Self {
        Self::from_naive(date)
    }
}

impl fmt::Display for RateDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_with(DATE_FORMAT))
    }
}

impl FromStr for RateDate {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RateDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_set() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_none()
        }
    }
}

struct RateDateVisitor;

impl<'de> Visitor<'de> for RateDateVisitor {
    type Value = RateDate;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a YYYY-MM-DD date, an RFC 3339 timestamp or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RateDate, E> {
        RateDate::parse(v).map_err(E::custom)
    }

    fn visit_none<E: de::Error>(self) -> Result<RateDate, E> {
        Ok(RateDate::UNSET)
    }

    fn visit_unit<E: de::Error>(self) -> Result<RateDate, E> {
        Ok(RateDate::UNSET)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RateDate, D::Error> {
        deserializer.deserialize_any(RateDateVisitor)
    }
}

impl<'de> Deserialize<'de> for RateDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RateDateVisitor)
    }
}

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    /// Today's date.
    fn today(&self) -> NaiveDate;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock pinned to a fixed date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> RateDate {
        RateDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn test_canonical_round_trip() {
        let parsed = RateDate::parse("2024-03-05").unwrap();
        assert_eq!(parsed.to_string(), "2024-03-05");
    }

    #[test]
    fn test_rfc3339_fallback_keeps_calendar_date() {
        let parsed = RateDate::parse("2024-03-05T23:15:00Z").unwrap();
        assert_eq!(parsed, date(2024, 3, 5));
    }

    #[test]
    fn test_canonical_only_rejects_timestamp() {
        assert!(RateDate::parse_canonical("2024-03-05T00:00:00Z").is_err());
        assert!(RateDate::parse_canonical("05.03.2024").is_err());
        assert!(RateDate::parse_canonical("").is_err());
    }

    #[test]
    fn test_unset_round_trip() {
        assert_eq!(RateDate::UNSET.to_string(), "null");
        assert_eq!(RateDate::parse("null").unwrap(), RateDate::UNSET);

        let json = serde_json::to_string(&RateDate::UNSET).unwrap();
        assert_eq!(json, "null");
        let back: RateDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RateDate::UNSET);
    }

    #[test]
    fn test_json_value_and_map_key() {
        let json = serde_json::to_string(&date(2024, 1, 2)).unwrap();
        assert_eq!(json, "\"2024-01-02\"");

        let mut series = BTreeMap::new();
        series.insert(date(2024, 1, 3), 1.5);
        series.insert(date(2024, 1, 2), 1.25);
        let json = serde_json::to_string(&series).unwrap();
        assert_eq!(json, r#"{"2024-01-02":1.25,"2024-01-03":1.5}"#);

        let back: BTreeMap<RateDate, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, series);
    }

    #[test]
    fn test_invalid_json_date_is_error() {
        assert!(serde_json::from_str::<RateDate>("\"2024-02-30\"").is_err());
        assert!(serde_json::from_str::<RateDate>("42").is_err());
    }

    #[test]
    fn test_shifts() {
        let d = date(2024, 3, 1);
        assert_eq!(d.add_days(-1), date(2024, 2, 29));
        assert_eq!(d.add_days(31), date(2024, 4, 1));
        assert_eq!(date(2024, 2, 29).months_before(12), date(2023, 2, 28));
        assert_eq!(RateDate::UNSET.add_days(3), RateDate::UNSET);
    }

    #[test]
    fn test_within_is_inclusive() {
        let start = date(2024, 1, 10);
        let end = date(2024, 1, 20);
        assert!(start.within(start, end));
        assert!(end.within(start, end));
        assert!(!date(2024, 1, 9).within(start, end));
        assert!(!date(2024, 1, 21).within(start, end));
        assert!(!RateDate::UNSET.within(RateDate::UNSET, end));
    }

    #[test]
    fn test_format_with_layout() {
        assert_eq!(date(2024, 1, 2).format_with("%d.%m.%Y"), "02.01.2024");
    }

    #[test]
    fn test_fixed_clock() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(FixedClock(today).today(), today);
    }

    proptest! {
        #[test]
        fn prop_format_parse_round_trip(days in 1i32..1_000_000) {
            let d = RateDate(Some(days));
            prop_assume!(d.naive().is_some());
            let text = d.to_string();
            prop_assert_eq!(RateDate::parse(&text).unwrap(), d);
        }

        #[test]
        fn prop_order_matches_calendar(a in 700_000i32..800_000, b in 700_000i32..800_000) {
            let (da, db) = (RateDate(Some(a)), RateDate(Some(b)));
            prop_assert_eq!(da.cmp(&db), da.naive().cmp(&db.naive()));
        }
    }
}
