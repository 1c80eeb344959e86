//! Currency codes and the registry of supported currencies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{RateError, Result};

/// ISO 4217 codes the upstream rate provider quotes.
const SUPPORTED_CODES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BRL", "BYN", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR",
    "GBP", "GEL", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KRW", "KZT", "MXN",
    "MYR", "NOK", "NZD", "PHP", "PLN", "RON", "RUB", "SEK", "SGD", "THB", "TRY", "UAH",
    "USD", "UZS", "ZAR",
];

/// Currency code as received from callers or the provider.
///
/// The value is kept verbatim; whether it names a supported currency is
/// decided by [`CurrencyRegistry`] only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a currency code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the code carries any value at all.
    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Immutable set of supported currencies.
///
/// Built once at startup and handed to whatever needs to validate codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyRegistry {
    codes: BTreeSet<CurrencyCode>,
}

impl CurrencyRegistry {
    /// Registry of every currency the upstream provider quotes.
    pub fn standard() -> Self {
        Self::from_codes(SUPPORTED_CODES.iter().copied())
    }

    /// Registry over a custom set of codes.
    pub fn from_codes<I, C>(codes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CurrencyCode>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a code is supported.
    pub fn is_valid(&self, code: &str) -> bool {
        self.codes.contains(&CurrencyCode::new(code))
    }

    /// All supported codes, ascending.
    pub fn all_codes(&self) -> impl Iterator<Item = &CurrencyCode> + '_ {
        self.codes.iter()
    }

    /// Number of supported codes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Validate a raw request parameter.
    ///
    /// `field` names the parameter in the returned error (`"base"`, `"second"`).
    pub fn validate(&self, field: &'static str, raw: &str) -> Result<CurrencyCode> {
        if self.is_valid(raw) {
            Ok(CurrencyCode::new(raw))
        } else {
            Err(RateError::InvalidCurrency {
                field,
                code: raw.to_string(),
            })
        }
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
