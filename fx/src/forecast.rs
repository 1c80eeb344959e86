//! Forecast service client.
//!
//! The forecaster receives a date-indexed history and answers with an
//! ordered list of predicted values. The caller decides which day the first
//! value belongs to.

use async_trait::async_trait;
use ratekeeper_common::RateSeries;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::error::{ProviderError, ProviderResult};

/// Produces predicted rates from a history.
#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Predict upcoming values, one per day, in chronological order.
    async fn predict(&self, history: &RateSeries) -> ProviderResult<Vec<f64>>;
}

/// Forecast service reached over HTTP.
///
/// The history is posted as a JSON object keyed by date; the answer is a
/// JSON array of numbers.
pub struct HttpForecaster {
    client: Client,
    url: String,
}

impl HttpForecaster {
    /// Create a forecaster posting to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Forecast(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Forecaster for HttpForecaster {
    #[instrument(skip(self, history), fields(points = history.len()))]
    async fn predict(&self, history: &RateSeries) -> ProviderResult<Vec<f64>> {
        let response = self
            .client
            .post(&self.url)
            .json(history)
            .send()
            .await
            .map_err(|e| ProviderError::Forecast(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Forecast request failed");
            return Err(ProviderError::Forecast(format!("unexpected HTTP status {status}")));
        }

        let values: Vec<f64> = response
            .json()
            .await
            .map_err(|e| ProviderError::Forecast(format!("malformed predictions: {e}")))?;

        debug!(predicted = values.len(), "Forecast received");
        Ok(values)
    }
}

/// Mock forecaster for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockForecaster {
    values: parking_lot::Mutex<Vec<f64>>,
    fail: std::sync::atomic::AtomicBool,
    histories: parking_lot::Mutex<Vec<RateSeries>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockForecaster {
    /// Create a forecaster answering with `values`.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: parking_lot::Mutex::new(values),
            fail: std::sync::atomic::AtomicBool::new(false),
            histories: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Make every call fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Histories received so far.
    pub fn histories(&self) -> Vec<RateSeries> {
        self.histories.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().len()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Forecaster for MockForecaster {
    async fn predict(&self, history: &RateSeries) -> ProviderResult<Vec<f64>> {
        self.histories.lock().push(history.clone());
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ProviderError::Forecast("mock failure".to_string()));
        }
        Ok(self.values.lock().clone())
    }
}
