//! # Settings Repository
//!
//! Key/value business settings. The engine reads two keys:
//!
//! | key                   | default | notes                     |
//! |-----------------------|---------|---------------------------|
//! | `currency`            | `USD`   | copied onto every order   |
//! | `low_stock_threshold` | `5`     | invalid → 5, clamped ≥ 1  |

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use basket_core::stock::LowStockThreshold;

pub const CURRENCY_KEY: &str = "currency";
pub const LOW_STOCK_THRESHOLD_KEY: &str = "low_stock_threshold";
pub const DEFAULT_CURRENCY: &str = "USD";

/// Repository for settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        Self::read(&mut conn, key).await
    }

    /// Inserts or replaces a setting.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, "Writing setting");

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn read(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(value)
    }

    pub async fn low_stock_threshold(conn: &mut SqliteConnection) -> DbResult<LowStockThreshold> {
        let raw = Self::read(conn, LOW_STOCK_THRESHOLD_KEY).await?;
        Ok(LowStockThreshold::from_setting(raw.as_deref()))
    }

    /// ISO currency code, upper-cased. Blank falls back to USD.
    pub async fn currency(conn: &mut SqliteConnection) -> DbResult<String> {
        let raw = Self::read(conn, CURRENCY_KEY).await?;
        Ok(raw
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()))
    }
}
