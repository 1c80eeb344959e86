//! Ratekeeper Store
//!
//! Persistent per-currency ban flags. The store only knows about currencies
//! that have been explicitly flagged; a missing row means "not banned".

pub mod bans;
pub mod postgres;

pub use bans::BanStore;
pub use postgres::PgBanStore;

#[cfg(any(test, feature = "test-utils"))]
pub use bans::MockBanStore;
