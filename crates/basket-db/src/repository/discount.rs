//! # Discount Repository
//!
//! Reads discount rows and turns them into [`Discount`] values, resolving
//! product/category targets from the association tables.
//!
//! ```text
//! discounts ──┬── discount_products   (scope = products)
//!             └── discount_categories (scope = categories)
//!                        │
//!                        ▼
//!        DiscountRecord::into_discount ──► Discount
//! ```
//!
//! A row that fails conversion surfaces as [`DbError::InvalidRecord`] when
//! asked for directly, and is skipped with a warning when scanning
//! automatic discounts.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use basket_core::discount::{
    Discount, DiscountCode, DiscountExtensions, DiscountRecord, DiscountScope, DiscountStatus,
    DiscountType, UsageCounter,
};
use basket_core::Money;

const DISCOUNT_COLUMNS: &str = "id, code, discount_type, scope, value, min_subtotal_cents, \
     usage_limit, usage_count, starts_at, ends_at, is_automatic, status, metadata, \
     created_at, updated_at";

/// Input for [`DiscountRepository::insert`].
#[derive(Debug, Clone)]
pub struct NewDiscount {
    /// Normalized before storage. `None` = automatic-only.
    pub code: Option<String>,
    pub discount_type: DiscountType,
    pub scope: DiscountScope,
    /// Hundredths (1000 = 10.00% or 10.00).
    pub value: i64,
    pub min_subtotal: Option<Money>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_automatic: bool,
    pub status: DiscountStatus,
    pub extensions: DiscountExtensions,
    pub product_ids: Vec<String>,
    pub category_ids: Vec<String>,
}

impl NewDiscount {
    fn active(discount_type: DiscountType, value: i64) -> Self {
        NewDiscount {
            code: None,
            discount_type,
            scope: DiscountScope::All,
            value,
            min_subtotal: None,
            usage_limit: None,
            usage_count: 0,
            starts_at: None,
            ends_at: None,
            is_automatic: false,
            status: DiscountStatus::Active,
            extensions: DiscountExtensions::default(),
            product_ids: Vec::new(),
            category_ids: Vec::new(),
        }
    }

    /// Active, store-wide percentage discount in hundredths of a percent.
    pub fn percentage(hundredths: i64) -> Self {
        Self::active(DiscountType::Percentage, hundredths)
    }

    /// Active, store-wide fixed discount.
    pub fn fixed_amount(amount: Money) -> Self {
        Self::active(DiscountType::FixedAmount, amount.cents())
    }

    /// Active, store-wide free-shipping discount.
    pub fn free_shipping() -> Self {
        Self::active(DiscountType::FreeShipping, 0)
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn automatic(mut self) -> Self {
        self.is_automatic = true;
        self
    }
}

/// Repository for discounts.
#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: SqlitePool,
}

impl DiscountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DiscountRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The raw row, for diagnostics and tests.
    pub async fn get_record(&self, id: &str) -> DbResult<Option<DiscountRecord>> {
        let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = ?1");
        let record = sqlx::query_as::<_, DiscountRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Discount>> {
        let sql = format!("SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = ?1");
        let record = sqlx::query_as::<_, DiscountRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match record {
            Some(record) => Ok(Some(self.hydrate(conn, record).await?)),
            None => Ok(None),
        }
    }

    /// Case-insensitive lookup of a normalized code.
    pub async fn find_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &DiscountCode,
    ) -> DbResult<Option<Discount>> {
        let sql = format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code = ?1 COLLATE NOCASE LIMIT 1"
        );
        let record = sqlx::query_as::<_, DiscountRecord>(&sql)
            .bind(code.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        match record {
            Some(record) => Ok(Some(self.hydrate(conn, record).await?)),
            None => Ok(None),
        }
    }

    /// Current usage counter, read inside the caller's transaction.
    pub async fn usage(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<UsageCounter>> {
        let row: Option<(Option<i64>, i64)> =
            sqlx::query_as("SELECT usage_limit, usage_count FROM discounts WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(row.map(|(limit, count)| UsageCounter { limit, count }))
    }

    /// Active automatic discounts in creation order.
    ///
    /// Window and usage checks are left to the selector.
    pub async fn automatic_candidates(&self, conn: &mut SqliteConnection) -> DbResult<Vec<Discount>> {
        let sql = format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts \
             WHERE is_automatic = 1 AND status = 'active' \
             ORDER BY created_at, id"
        );
        let records = sqlx::query_as::<_, DiscountRecord>(&sql)
            .fetch_all(&mut *conn)
            .await?;

        let mut discounts = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            match self.hydrate(conn, record).await {
                Ok(discount) => discounts.push(discount),
                Err(DbError::InvalidRecord { reason, .. }) => {
                    warn!(discount_id = %id, reason = %reason, "Skipping malformed automatic discount");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(discounts)
    }

    async fn hydrate(&self, conn: &mut SqliteConnection, record: DiscountRecord) -> DbResult<Discount> {
        let product_ids: Vec<String> = if record.scope == DiscountScope::Products {
            sqlx::query_scalar("SELECT product_id FROM discount_products WHERE discount_id = ?1")
                .bind(&record.id)
                .fetch_all(&mut *conn)
                .await?
        } else {
            Vec::new()
        };

        let category_ids: Vec<String> = if record.scope == DiscountScope::Categories {
            sqlx::query_scalar("SELECT category_id FROM discount_categories WHERE discount_id = ?1")
                .bind(&record.id)
                .fetch_all(&mut *conn)
                .await?
        } else {
            Vec::new()
        };

        let id = record.id.clone();
        record
            .into_discount(product_ids, category_ids)
            .map_err(|e| DbError::invalid_record("Discount", id, e))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a discount and its target associations. Returns the id.
    pub async fn insert(&self, discount: &NewDiscount) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let code = discount
            .code
            .as_deref()
            .map(DiscountCode::parse)
            .transpose()
            .map_err(|e| DbError::invalid_record("Discount", &id, e))?;

        debug!(id = %id, code = ?code.as_ref().map(|c| c.as_str()), "Inserting discount");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO discounts (
                id, code, discount_type, scope, value, min_subtotal_cents,
                usage_limit, usage_count, starts_at, ends_at, is_automatic, status,
                metadata, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            "#,
        )
        .bind(&id)
        .bind(code.as_ref().map(|c| c.as_str()))
        .bind(discount.discount_type)
        .bind(discount.scope)
        .bind(discount.value)
        .bind(discount.min_subtotal.map(|m| m.cents()))
        .bind(discount.usage_limit)
        .bind(discount.usage_count)
        .bind(discount.starts_at)
        .bind(discount.ends_at)
        .bind(discount.is_automatic)
        .bind(discount.status)
        .bind(discount.extensions.to_metadata())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for product_id in &discount.product_ids {
            sqlx::query("INSERT INTO discount_products (discount_id, product_id) VALUES (?1, ?2)")
                .bind(&id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        for category_id in &discount.category_ids {
            sqlx::query("INSERT INTO discount_categories (discount_id, category_id) VALUES (?1, ?2)")
                .bind(&id)
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Adds one use, only while the limit allows it.
    ///
    /// ## Returns
    /// * `Ok(true)` - counter incremented
    /// * `Ok(false)` - no such discount, or its limit is already reached
    pub async fn increment_usage(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        debug!(id = %id, "Incrementing discount usage");

        let result = sqlx::query(
            r#"
            UPDATE discounts
            SET usage_count = usage_count + 1, updated_at = ?2
            WHERE id = ?1 AND (usage_limit IS NULL OR usage_count < usage_limit)
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_status(&self, id: &str, status: DiscountStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE discounts SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Discount", id));
        }
        Ok(())
    }

    /// Overwrites the raw metadata column.
    pub async fn set_metadata(&self, id: &str, metadata: Option<&str>) -> DbResult<()> {
        sqlx::query("UPDATE discounts SET metadata = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(metadata)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM discounts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Discount", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::tests::seed_product;
    use basket_core::discount::{BundleRule, DiscountBenefit, DiscountTarget};
    use std::collections::BTreeSet;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_code_lookup_is_case_insensitive() {
        let db = db().await;
        let id = db
            .discounts()
            .insert(&NewDiscount::fixed_amount(Money::from_cents(500)).with_code(" save5 "))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let code = DiscountCode::parse("Save5").unwrap();
        let found = db.discounts().find_by_code(&mut conn, &code).await.unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.benefit, DiscountBenefit::FixedAmount(Money::from_cents(500)));
        assert_eq!(found.code.unwrap().as_str(), "SAVE5");
    }

    #[tokio::test]
    async fn test_product_targets_and_extensions_hydrate() {
        let db = db().await;
        let product_id = seed_product(&db, "MUG", 1000).await;
        let mut new = NewDiscount::percentage(2000);
        new.scope = DiscountScope::Products;
        new.product_ids = vec![product_id.clone()];
        new.extensions.bundle = Some(BundleRule { min_quantity: 2 });
        let id = db.discounts().insert(&new).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let found = db.discounts().find_by_id(&mut conn, &id).await.unwrap().unwrap();
        assert_eq!(found.target, DiscountTarget::Products(BTreeSet::from([product_id])));
        assert_eq!(found.extensions.bundle, Some(BundleRule { min_quantity: 2 }));
    }

    #[tokio::test]
    async fn test_automatic_candidates_skip_malformed_and_inactive() {
        let db = db().await;
        let repo = db.discounts();
        let good = repo.insert(&NewDiscount::percentage(1000).automatic()).await.unwrap();
        let broken = repo.insert(&NewDiscount::percentage(500).automatic()).await.unwrap();
        repo.set_metadata(&broken, Some(r#"{"version":9}"#)).await.unwrap();
        let draft = repo.insert(&NewDiscount::percentage(700).automatic()).await.unwrap();
        repo.set_status(&draft, DiscountStatus::Draft).await.unwrap();
        repo.insert(&NewDiscount::percentage(900).with_code("CODEONLY")).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let candidates = repo.automatic_candidates(&mut conn).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, good);

        let err = repo.find_by_id(&mut conn, &broken).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn test_increment_usage_respects_limit() {
        let db = db().await;
        let mut new = NewDiscount::percentage(1000).with_code("ONCE");
        new.usage_limit = Some(1);
        let id = db.discounts().insert(&new).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(db.discounts().increment_usage(&mut conn, &id).await.unwrap());
        assert!(!db.discounts().increment_usage(&mut conn, &id).await.unwrap());
        drop(conn);

        let record = db.discounts().get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.usage_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_codes_rejected() {
        let db = db().await;
        let repo = db.discounts();
        repo.insert(&NewDiscount::percentage(1000).with_code("DUP")).await.unwrap();
        let err = repo
            .insert(&NewDiscount::percentage(1000).with_code("dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
