//! Ban store contract.

use async_trait::async_trait;
use ratekeeper_common::{CurrencyCode, CurrencyWithBanStatus, Result};

/// Authoritative storage for currency ban flags.
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Rows stored for any of `codes`, in no particular order.
    ///
    /// Codes that were never flagged are absent from the result.
    async fn list_bans(&self, codes: &[CurrencyCode]) -> Result<Vec<CurrencyWithBanStatus>>;

    /// Insert or overwrite the flag for `code`.
    async fn upsert_ban(&self, code: &CurrencyCode, banned: bool) -> Result<()>;
}

/// In-memory ban store for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockBanStore {
    rows: dashmap::DashMap<CurrencyCode, bool>,
    fail: std::sync::atomic::AtomicBool,
    list_calls: std::sync::atomic::AtomicUsize,
    upsert_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockBanStore {
    pub fn new() -> Self {
        Self {
            rows: dashmap::DashMap::new(),
            fail: std::sync::atomic::AtomicBool::new(false),
            list_calls: std::sync::atomic::AtomicUsize::new(0),
            upsert_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Seed a row without counting a call.
    pub fn insert(&self, code: impl Into<CurrencyCode>, banned: bool) {
        self.rows.insert(code.into(), banned);
    }

    /// Stored flag for `code`, if any.
    pub fn stored(&self, code: &str) -> Option<bool> {
        self.rows.get(&CurrencyCode::new(code)).map(|r| *r)
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Make every call fail with a database error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.upsert_calls()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ratekeeper_common::RateError::Database(
                "mock store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockBanStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl BanStore for MockBanStore {
    async fn list_bans(&self, codes: &[CurrencyCode]) -> Result<Vec<CurrencyWithBanStatus>> {
        self.list_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.check()?;

        Ok(codes
            .iter()
            .filter_map(|code| {
                self.rows
                    .get(code)
                    .map(|banned| CurrencyWithBanStatus::new(code.clone(), *banned))
            })
            .collect())
    }

    async fn upsert_ban(&self, code: &CurrencyCode, banned: bool) -> Result<()> {
        self.upsert_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.check()?;

        self.rows.insert(code.clone(), banned);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_common::RateError;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_list_returns_only_stored_rows() {
        let store = MockBanStore::new();
        store.insert("EUR", true);
        store.insert("JPY", false);

        let codes: Vec<CurrencyCode> = vec!["EUR".into(), "USD".into()];
        let rows = store.list_bans(&codes).await.unwrap();

        assert_eq!(rows, vec![CurrencyWithBanStatus::new("EUR".into(), true)]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MockBanStore::new();
        let usd: CurrencyCode = "USD".into();

        assert_ok!(store.upsert_ban(&usd, true).await);
        assert_ok!(store.upsert_ban(&usd, true).await);

        assert_eq!(store.stored("USD"), Some(true));
        assert_eq!(store.row_count(), 1);

        assert_ok!(store.upsert_ban(&usd, false).await);
        assert_eq!(store.stored("USD"), Some(false));
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_is_database_error() {
        let store = MockBanStore::new();
        store.set_fail(true);

        let err = assert_err!(store.upsert_ban(&"USD".into(), true).await);
        assert!(matches!(err, RateError::Database(_)));
        assert_eq!(store.row_count(), 0);
    }
}
