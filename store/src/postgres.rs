//! Postgres ban store.

use async_trait::async_trait;
use ratekeeper_common::{CurrencyCode, CurrencyWithBanStatus, RateError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::bans::BanStore;

#[derive(Debug, sqlx::FromRow)]
struct BanRow {
    currency: String,
    banned: bool,
}

impl From<BanRow> for CurrencyWithBanStatus {
    fn from(row: BanRow) -> Self {
        CurrencyWithBanStatus::new(CurrencyCode::new(row.currency), row.banned)
    }
}

fn database_error(err: sqlx::Error) -> RateError {
    RateError::Database(err.to_string())
}

/// Ban flags in the `currency_bans` table.
#[derive(Clone)]
pub struct PgBanStore {
    pool: PgPool,
}

impl PgBanStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(database_error)?;

        info!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Create the table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS currency_bans (
                currency TEXT PRIMARY KEY,
                banned BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BanStore for PgBanStore {
    #[instrument(skip(self, codes), fields(codes = codes.len()))]
    async fn list_bans(&self, codes: &[CurrencyCode]) -> Result<Vec<CurrencyWithBanStatus>> {
        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, BanRow>(
            "SELECT currency, banned FROM currency_bans WHERE currency = ANY($1)",
        )
        .bind(&codes)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        debug!(rows = rows.len(), "Loaded ban flags");
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(currency = %code))]
    async fn upsert_ban(&self, code: &CurrencyCode, banned: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO currency_bans (currency, banned)
            VALUES ($1, $2)
            ON CONFLICT (currency) DO UPDATE SET banned = EXCLUDED.banned
            "#,
        )
        .bind(code.as_str())
        .bind(banned)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion() {
        let status: CurrencyWithBanStatus = BanRow {
            currency: "EUR".to_string(),
            banned: true,
        }
        .into();

        assert_eq!(status.currency.as_str(), "EUR");
        assert!(status.banned);
    }

    #[test]
    fn test_sqlx_error_maps_to_database() {
        let err = database_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, RateError::Database(_)));
        assert!(!err.is_client_fault());
    }
}
