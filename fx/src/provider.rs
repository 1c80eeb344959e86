//! Upstream exchange-rate provider trait and HTTP client.

use async_trait::async_trait;
use ratekeeper_common::{
    CurrencyCode, CurrencyRates, CurrencyTimelineRate, RateDate, RateSeries, DATE_FORMAT,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Date layout the provider expects in the snapshot path.
pub const SNAPSHOT_DATE_FORMAT: &str = "%d.%m.%Y";

/// Decimal places requested from the provider.
const RATE_PLACES: &str = "4";

/// Source of truth for exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Rates of `base` against every quoted currency on `as_of`.
    async fn fetch_snapshot(
        &self,
        base: &CurrencyCode,
        as_of: RateDate,
    ) -> ProviderResult<CurrencyRates>;

    /// Daily rates of one pair over `[start, end]`.
    async fn fetch_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
        start: RateDate,
        end: RateDate,
    ) -> ProviderResult<CurrencyTimelineRate>;
}

/// Snapshot payload as sent by the provider.
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    success: bool,
    #[serde(default)]
    base: Option<CurrencyCode>,
    #[serde(default)]
    rates: HashMap<CurrencyCode, f64>,
    #[serde(default)]
    date: RateDate,
}

/// Time-series payload as sent by the provider.
#[derive(Debug, Deserialize)]
struct TimelineResponse {
    success: bool,
    #[serde(default)]
    base: Option<CurrencyCode>,
    #[serde(default)]
    rates: BTreeMap<RateDate, HashMap<CurrencyCode, f64>>,
    #[serde(default)]
    start_date: RateDate,
    #[serde(default)]
    end_date: RateDate,
}

impl TimelineResponse {
    /// Keep only `second`, skipping days on which it was not quoted.
    fn into_pair(self, base: &CurrencyCode, second: &CurrencyCode) -> ProviderResult<CurrencyTimelineRate> {
        let base = self.base.unwrap_or_else(|| base.clone());
        let rates: RateSeries = self
            .rates
            .into_iter()
            .filter_map(|(date, day)| day.get(second).map(|rate| (date, *rate)))
            .collect();

        if rates.is_empty() {
            return Err(ProviderError::RateNotFound {
                base,
                second: second.clone(),
            });
        }

        Ok(CurrencyTimelineRate {
            base,
            second: second.clone(),
            rates,
            predictions: RateSeries::new(),
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

/// Configuration for the provider client.
#[derive(Debug, Clone)]
pub struct ExchangerConfig {
    /// Base URL of the provider API.
    pub base_url: String,
    /// Per-request timeout enforced by the HTTP client.
    pub timeout: Duration,
}

impl Default for ExchangerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchangerate.host".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP client for the exchange-rate provider.
pub struct ExchangerClient {
    client: Client,
    base_url: String,
}

impl ExchangerClient {
    /// Create a new client.
    pub fn new(config: ExchangerConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ratekeeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL being used.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str, params: &[(&str, &str)]) -> ProviderResult<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| ProviderError::Transport(format!("invalid provider URL: {e}")))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, url: Url) -> ProviderResult<T> {
        debug!(%url, "Requesting rates");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            error!(endpoint, status = %status, "Provider request failed");
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RateProvider for ExchangerClient {
    fn name(&self) -> &str {
        "exchanger"
    }

    #[instrument(skip(self), fields(base = %base, as_of = %as_of))]
    async fn fetch_snapshot(
        &self,
        base: &CurrencyCode,
        as_of: RateDate,
    ) -> ProviderResult<CurrencyRates> {
        let endpoint = "snapshot";
        let url = self.build_url(
            &as_of.format_with(SNAPSHOT_DATE_FORMAT),
            &[("base", base.as_str()), ("places", RATE_PLACES)],
        )?;

        let response: SnapshotResponse = self.get_json(endpoint, url).await?;
        if !response.success {
            return Err(ProviderError::Unsuccessful(endpoint.to_string()));
        }

        debug!(quoted = response.rates.len(), date = %response.date, "Snapshot received");
        Ok(CurrencyRates {
            base: response.base.unwrap_or_else(|| base.clone()),
            rates: response.rates,
            date: response.date,
        })
    }

    #[instrument(skip(self), fields(base = %base, second = %second, start = %start, end = %end))]
    async fn fetch_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
        start: RateDate,
        end: RateDate,
    ) -> ProviderResult<CurrencyTimelineRate> {
        let endpoint = "timeseries";
        let start_date = start.format_with(DATE_FORMAT);
        let end_date = end.format_with(DATE_FORMAT);
        let url = self.build_url(
            endpoint,
            &[
                ("start_date", start_date.as_str()),
                ("end_date", end_date.as_str()),
                ("base", base.as_str()),
                ("symbols", second.as_str()),
                ("places", RATE_PLACES),
            ],
        )?;

        let response: TimelineResponse = self.get_json(endpoint, url).await?;
        if !response.success {
            return Err(ProviderError::Unsuccessful(endpoint.to_string()));
        }

        debug!(days = response.rates.len(), "Timeline received");
        response.into_pair(base, second)
    }
}

/// Recorded timeline request.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineCall {
    pub base: CurrencyCode,
    pub second: CurrencyCode,
    pub start: RateDate,
    pub end: RateDate,
}

/// Mock rate provider for testing.
///
/// Serves snapshots per base and timelines per pair, and records each call.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    snapshots: dashmap::DashMap<CurrencyCode, CurrencyRates>,
    timelines: dashmap::DashMap<(CurrencyCode, CurrencyCode), CurrencyTimelineRate>,
    snapshot_calls: parking_lot::Mutex<Vec<(CurrencyCode, RateDate)>>,
    timeline_calls: parking_lot::Mutex<Vec<TimelineCall>>,
    delay: parking_lot::Mutex<Option<Duration>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snapshots: dashmap::DashMap::new(),
            timelines: dashmap::DashMap::new(),
            snapshot_calls: parking_lot::Mutex::new(Vec::new()),
            timeline_calls: parking_lot::Mutex::new(Vec::new()),
            delay: parking_lot::Mutex::new(None),
        }
    }

    /// Serve this snapshot for its base currency.
    pub fn set_snapshot(&self, snapshot: CurrencyRates) {
        self.snapshots.insert(snapshot.base.clone(), snapshot);
    }

    /// Serve this timeline for its pair.
    pub fn set_timeline(&self, timeline: CurrencyTimelineRate) {
        self.timelines
            .insert((timeline.base.clone(), timeline.second.clone()), timeline);
    }

    /// Delay every answer.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Snapshot requests received so far.
    pub fn snapshot_calls(&self) -> Vec<(CurrencyCode, RateDate)> {
        self.snapshot_calls.lock().clone()
    }

    /// Timeline requests received so far.
    pub fn timeline_calls(&self) -> Vec<TimelineCall> {
        self.timeline_calls.lock().clone()
    }

    /// Total requests of any kind.
    pub fn total_calls(&self) -> usize {
        self.snapshot_calls.lock().len() + self.timeline_calls.lock().len()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_snapshot(
        &self,
        base: &CurrencyCode,
        as_of: RateDate,
    ) -> ProviderResult<CurrencyRates> {
        self.snapshot_calls.lock().push((base.clone(), as_of));
        self.pause().await;
        self.snapshots
            .get(base)
            .map(|s| s.clone())
            .ok_or_else(|| ProviderError::Unsuccessful("snapshot".to_string()))
    }

    async fn fetch_timeline(
        &self,
        base: &CurrencyCode,
        second: &CurrencyCode,
        start: RateDate,
        end: RateDate,
    ) -> ProviderResult<CurrencyTimelineRate> {
        self.timeline_calls.lock().push(TimelineCall {
            base: base.clone(),
            second: second.clone(),
            start,
            end,
        });
        self.pause().await;
        self.timelines
            .get(&(base.clone(), second.clone()))
            .map(|t| t.clone())
            .ok_or_else(|| ProviderError::Unsuccessful("timeseries".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> RateDate {
        RateDate::from_ymd(y, m, d).unwrap()
    }

    fn client_for(server: &MockServer) -> ExchangerClient {
        ExchangerClient::new(ExchangerConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/01.01.2024"))
            .and(query_param("base", "USD"))
            .and(query_param("places", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"base":"USD","date":"2024-01-01","rates":{"EUR":0.9051,"GBP":0.7855}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client_for(&server)
            .fetch_snapshot(&"USD".into(), date(2024, 1, 1))
            .await
            .unwrap();

        assert_eq!(snapshot.base.as_str(), "USD");
        assert_eq!(snapshot.date, date(2024, 1, 1));
        assert_eq!(snapshot.rates.get(&"EUR".into()), Some(&0.9051));
        assert_eq!(snapshot.rates.len(), 2);
    }

    #[tokio::test]
    async fn test_unsuccessful_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":false}"#))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_snapshot(&"USD".into(), date(2024, 1, 1))
            .await;

        assert!(matches!(result, Err(ProviderError::Unsuccessful(_))));
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_snapshot(&"USD".into(), date(2024, 1, 1))
            .await;

        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_snapshot(&"USD".into(), date(2024, 1, 1))
            .await;

        assert!(matches!(result, Err(ProviderError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_fetch_timeline_projects_pair() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timeseries"))
            .and(query_param("start_date", "2024-01-01"))
            .and(query_param("end_date", "2024-01-03"))
            .and(query_param("base", "USD"))
            .and(query_param("symbols", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "success": true,
                    "base": "USD",
                    "start_date": "2024-01-01",
                    "end_date": "2024-01-03",
                    "rates": {
                        "2024-01-01": {"EUR": 0.91},
                        "2024-01-02": {},
                        "2024-01-03": {"EUR": 0.93}
                    }
                }"#,
            ))
            .mount(&server)
            .await;

        let timeline = client_for(&server)
            .fetch_timeline(&"USD".into(), &"EUR".into(), date(2024, 1, 1), date(2024, 1, 3))
            .await
            .unwrap();

        assert_eq!(timeline.second.as_str(), "EUR");
        assert_eq!(
            timeline.rates,
            RateSeries::from([(date(2024, 1, 1), 0.91), (date(2024, 1, 3), 0.93)])
        );
        assert!(timeline.predictions.is_empty());
        assert_eq!(timeline.start_date, date(2024, 1, 1));
        assert_eq!(timeline.end_date, date(2024, 1, 3));
    }

    #[tokio::test]
    async fn test_timeline_without_target_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timeseries"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"base":"USD","rates":{"2024-01-01":{"GBP":0.78}}}"#,
            ))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_timeline(&"USD".into(), &"EUR".into(), date(2024, 1, 1), date(2024, 1, 1))
            .await;

        assert!(matches!(result, Err(ProviderError::RateNotFound { .. })));
    }

    #[tokio::test]
    async fn test_mock_provider_records_calls() {
        let provider = MockRateProvider::new("test");
        provider.set_snapshot(CurrencyRates {
            base: "USD".into(),
            rates: HashMap::from([("EUR".into(), 0.92)]),
            date: date(2024, 1, 1),
        });

        let snapshot = provider.fetch_snapshot(&"USD".into(), date(2024, 1, 1)).await.unwrap();
        assert_eq!(snapshot.rates.len(), 1);
        assert!(provider.fetch_snapshot(&"EUR".into(), date(2024, 1, 1)).await.is_err());

        assert_eq!(provider.snapshot_calls().len(), 2);
        assert_eq!(provider.total_calls(), 2);
    }
}
