//! Cache and provider error types.

use ratekeeper_common::{CurrencyCode, RateError};
use thiserror::Error;

/// Errors raised by a rate cache backend.
///
/// A key that is simply absent is not an error; backends report it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend unreachable or command failed.
    #[error("cache backend unavailable: {0}")]
    Backend(String),

    /// Stored payload could not be decoded.
    #[error("malformed cached payload under '{key}': {reason}")]
    MalformedPayload { key: String, reason: String },

    /// Value could not be encoded for storage.
    #[error("failed to encode value for '{key}': {reason}")]
    Encode { key: String, reason: String },

    /// Backend acknowledged the command but reported no change.
    #[error("cache reported no change for '{0}'")]
    NotWritten(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for RateError {
    fn from(err: CacheError) -> Self {
        RateError::Cache(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Errors raised when talking to the upstream rate or forecast services.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request could not be built or sent.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("unexpected HTTP status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Body could not be decoded.
    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// Provider answered with `success: false`.
    #[error("unsuccessful getting new rates from {0}")]
    Unsuccessful(String),

    /// Provider does not quote the requested pair.
    #[error("cannot find rate for '{second}' against '{base}'")]
    RateNotFound {
        base: CurrencyCode,
        second: CurrencyCode,
    },

    /// Forecast service failure.
    #[error("forecast service: {0}")]
    Forecast(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<ProviderError> for RateError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateNotFound { base, second } => RateError::RateNotFound { base, second },
            ProviderError::Forecast(msg) => RateError::Forecast(msg),
            other => RateError::Provider(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_stays_client_fault() {
        let err: RateError = ProviderError::RateNotFound {
            base: "USD".into(),
            second: "RUB".into(),
        }
        .into();
        assert!(err.is_client_fault());
        assert_eq!(err.error_code(), "RATE_NOT_FOUND");
    }

    #[test]
    fn test_transport_is_server_fault() {
        let err: RateError = ProviderError::Status {
            endpoint: "timeseries".into(),
            status: 502,
        }
        .into();
        assert!(!err.is_client_fault());
        assert_eq!(
            err.to_string(),
            "rate provider error: unexpected HTTP status 502 from timeseries"
        );
    }

    #[test]
    fn test_cache_error_maps_to_cache() {
        let err: RateError = CacheError::NotWritten("available".into()).into();
        assert_eq!(err.error_code(), "CACHE_ERROR");
    }
}
