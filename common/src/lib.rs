//! Ratekeeper Common Types
//!
//! This crate contains the types shared across the Ratekeeper service,
//! including the currency registry, the calendar date codec used for rate
//! series keys, rate models and the error taxonomy.

pub mod currency;
pub mod error;
pub mod rates;
pub mod time;

pub use currency::*;
pub use error::*;
pub use rates::*;
pub use time::*;
