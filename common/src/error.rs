//! Error types for Ratekeeper.

use crate::currency::CurrencyCode;
use thiserror::Error;

/// Main error type for rate queries.
///
/// Variants fall in three groups: validation failures raised before any I/O,
/// pairs the upstream provider does not offer, and dependency failures
/// (cache, database, provider, forecast, timeouts).
#[derive(Error, Debug)]
pub enum RateError {
    /// Currency code not present in the registry.
    #[error("invalid {field} currency code: '{code}'")]
    InvalidCurrency { field: &'static str, code: String },

    /// Date parameter that does not parse.
    #[error("invalid {field} period date: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    /// Requested period with start after end.
    #[error("invalid period: start {start} is after end {end}")]
    InvalidPeriod { start: String, end: String },

    /// Malformed request body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider answered but does not quote the requested pair.
    #[error("cannot find rate for '{second}' against '{base}'")]
    RateNotFound {
        base: CurrencyCode,
        second: CurrencyCode,
    },

    /// Cache backend failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Relational store failure.
    #[error("database error: {0}")]
    Database(String),

    /// Upstream rate provider failure.
    #[error("rate provider error: {0}")]
    Provider(String),

    /// Forecast service failure.
    #[error("forecast error: {0}")]
    Forecast(String),

    /// Operation exceeded its time budget.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RateError {
    /// Check if the caller is at fault (4xx class).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            RateError::InvalidCurrency { .. }
                | RateError::InvalidDate { .. }
                | RateError::InvalidPeriod { .. }
                | RateError::InvalidRequest(_)
                | RateError::RateNotFound { .. }
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RateError::InvalidCurrency { .. } => "INVALID_CURRENCY",
            RateError::InvalidDate { .. } => "INVALID_DATE",
            RateError::InvalidPeriod { .. } => "INVALID_PERIOD",
            RateError::InvalidRequest(_) => "INVALID_REQUEST",
            RateError::RateNotFound { .. } => "RATE_NOT_FOUND",
            RateError::Cache(_) => "CACHE_ERROR",
            RateError::Database(_) => "DATABASE_ERROR",
            RateError::Provider(_) => "PROVIDER_ERROR",
            RateError::Forecast(_) => "FORECAST_ERROR",
            RateError::Timeout(_) => "TIMEOUT",
            RateError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Prefix a dependency failure with the operation that hit it.
    ///
    /// Client faults are returned untouched so their message stays stable.
    pub fn context(self, operation: &str) -> Self {
        match self {
            RateError::Cache(msg) => RateError::Cache(format!("{operation}: {msg}")),
            RateError::Database(msg) => RateError::Database(format!("{operation}: {msg}")),
            RateError::Provider(msg) => RateError::Provider(format!("{operation}: {msg}")),
            RateError::Forecast(msg) => RateError::Forecast(format!("{operation}: {msg}")),
            RateError::Timeout(msg) => RateError::Timeout(format!("{operation}: {msg}")),
            other => other,
        }
    }
}

/// Result type alias for rate operations.
pub type Result<T> = std::result::Result<T, RateError>;
