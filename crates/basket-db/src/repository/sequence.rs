//! # Sequence Repository
//!
//! Human-facing document numbers: `ORD-000001`, `ORD-000002`, ...
//!
//! One counter per prefix, bumped with a single upsert so two callers can
//! never receive the same value.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for document numbering.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Mints the next number for `prefix`.
    ///
    /// Runs in its own statement: a checkout that later fails leaves a gap,
    /// never a duplicate.
    pub async fn next_document_number(&self, prefix: &str) -> DbResult<String> {
        let prefix = prefix.trim().to_uppercase();

        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (prefix, last_value) VALUES (?1, 1)
            ON CONFLICT(prefix) DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(&prefix)
        .fetch_one(&self.pool)
        .await?;

        let number = format_document_number(&prefix, value);
        debug!(prefix = %prefix, number = %number, "Minted document number");
        Ok(number)
    }
}

/// `{PREFIX}-{NNNNNN}`, widening past six digits as needed.
pub fn format_document_number(prefix: &str, value: i64) -> String {
    format!("{prefix}-{value:06}")
}
