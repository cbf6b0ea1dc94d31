//! # Database Migrations
//!
//! Embedded SQL migrations from `migrations/sqlite/`.
//!
//! ```text
//! Database::new ──► _sqlx_migrations present? ──► apply pending in order
//!                                                  001_initial_schema.sql
//! ```
//!
//! New migrations get the next sequence number (`002_...sql`); applied
//! files are never edited.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Counts reported by [`migration_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migrations embedded in this binary.
    pub embedded: usize,
    /// Migrations recorded as applied in the database.
    pub applied: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.embedded
    }
}

/// Runs all pending migrations. Safe to call repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Embedded vs applied migration counts, for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let embedded = MIGRATOR.migrations.len();

    // Table is missing until the first run
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok(MigrationStatus {
        embedded,
        applied: applied as usize,
    })
}
