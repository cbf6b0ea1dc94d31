//! # Inventory Reservation
//!
//! Moves stock from "available" to "reserved" for every line of an order,
//! inside the caller's transaction. Nothing else in the workspace writes
//! the reserved/available columns or the derived product stock flags.
//!
//! ## Update Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Reservation Strategy                             │
//! │                                                                     │
//! │  ❌ WRONG: read, check in Rust, write back                         │
//! │     SELECT stock ...; if stock >= 3 { UPDATE ... SET stock = 7 }   │
//! │                                                                     │
//! │  ✅ Variant line: one guarded statement                            │
//! │     UPDATE product_variants                                        │
//! │     SET reserved_quantity = reserved_quantity + 3                  │
//! │     WHERE id = ? AND stock_quantity - reserved_quantity >= 3       │
//! │     0 rows ──► InsufficientStock                                   │
//! │                                                                     │
//! │  ✅ Pooled line: pick one row at a time                            │
//! │     most available first, then most recently updated               │
//! │     take min(remaining, row.available) with a guarded UPDATE       │
//! │     guard fails ──► skip that row, pick again                      │
//! │     no row left  ──► InsufficientStock                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers hold the store's write lock for the whole transaction (the
//! checkout claims its cart row first), so a skipped row is one whose
//! stock changed between pick and update. Any error leaves partial
//! reservations in the transaction; the caller rolls it back.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use thiserror::Error;
use tracing::debug;

use crate::error::DbError;
use basket_core::stock::{LowStockThreshold, StockStatus};
use basket_core::CartItem;

/// One order line as the reservation step sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    /// Used in the insufficient-stock message.
    pub product_name: String,
    pub quantity: i64,
}

impl ReservationLine {
    pub fn from_cart_item(item: &CartItem) -> Self {
        ReservationLine {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            product_name: item.display_name(),
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Insufficient stock for {product}: requested {requested}")]
    InsufficientStock { product: String, requested: i64 },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for ReservationError {
    fn from(err: sqlx::Error) -> Self {
        ReservationError::Db(err.into())
    }
}

impl ReservationError {
    fn insufficient(line: &ReservationLine) -> Self {
        ReservationError::InsufficientStock {
            product: line.product_name.clone(),
            requested: line.quantity,
        }
    }
}

/// Reserves every line in order. The first failure stops the loop.
pub async fn reserve_lines(
    conn: &mut SqliteConnection,
    lines: &[ReservationLine],
    threshold: LowStockThreshold,
) -> Result<(), ReservationError> {
    for line in lines {
        match &line.variant_id {
            Some(variant_id) => reserve_variant(conn, line, variant_id, threshold).await?,
            None => reserve_pooled(conn, line, threshold).await?,
        }
    }
    Ok(())
}

async fn reserve_variant(
    conn: &mut SqliteConnection,
    line: &ReservationLine,
    variant_id: &str,
    threshold: LowStockThreshold,
) -> Result<(), ReservationError> {
    debug!(
        product_id = %line.product_id,
        variant_id = %variant_id,
        quantity = line.quantity,
        "Reserving variant stock"
    );

    let result = sqlx::query(
        r#"
        UPDATE product_variants
        SET reserved_quantity = reserved_quantity + ?3, updated_at = ?4
        WHERE id = ?1
          AND product_id = ?2
          AND is_active = 1
          AND stock_quantity - reserved_quantity >= ?3
        "#,
    )
    .bind(variant_id)
    .bind(&line.product_id)
    .bind(line.quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ReservationError::insufficient(line));
    }

    refresh_variant_stock(conn, &line.product_id, threshold).await?;
    Ok(())
}

async fn reserve_pooled(
    conn: &mut SqliteConnection,
    line: &ReservationLine,
    threshold: LowStockThreshold,
) -> Result<(), ReservationError> {
    let mut remaining = line.quantity;
    let mut skipped: Vec<String> = Vec::new();

    while remaining > 0 {
        let mut pick = QueryBuilder::<Sqlite>::new(
            "SELECT id, available_quantity FROM inventory WHERE product_id = ",
        );
        pick.push_bind(line.product_id.clone());
        pick.push(" AND available_quantity > 0");
        if !skipped.is_empty() {
            pick.push(" AND id NOT IN (");
            let mut ids = pick.separated(", ");
            for id in &skipped {
                ids.push_bind(id.clone());
            }
            ids.push_unseparated(")");
        }
        pick.push(" ORDER BY available_quantity DESC, updated_at DESC LIMIT 1");

        let row = pick
            .build_query_as::<(String, i64)>()
            .fetch_optional(&mut *conn)
            .await?;

        let Some((row_id, available)) = row else {
            return Err(ReservationError::insufficient(line));
        };

        let take = remaining.min(available);
        let result = sqlx::query(
            r#"
            UPDATE inventory
            SET available_quantity = available_quantity - ?2,
                reserved_quantity = reserved_quantity + ?2,
                updated_at = ?3
            WHERE id = ?1 AND available_quantity >= ?2
            "#,
        )
        .bind(&row_id)
        .bind(take)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            debug!(inventory_id = %row_id, "Inventory row changed under us, skipping");
            skipped.push(row_id);
            continue;
        }

        debug!(
            product_id = %line.product_id,
            inventory_id = %row_id,
            reserved = take,
            "Reserved pooled stock"
        );
        remaining -= take;
    }

    refresh_pooled_stock(conn, &line.product_id, threshold).await?;
    Ok(())
}

/// Recomputes a product's availability from its active variants.
pub async fn refresh_variant_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    threshold: LowStockThreshold,
) -> Result<(), DbError> {
    let available: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(stock_quantity - reserved_quantity), 0)
        FROM product_variants
        WHERE product_id = ?1 AND is_active = 1
        "#,
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    write_stock_status(conn, product_id, available, threshold).await
}

/// Recomputes a product's availability from its inventory rows.
pub async fn refresh_pooled_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    threshold: LowStockThreshold,
) -> Result<(), DbError> {
    let available: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(available_quantity), 0) FROM inventory WHERE product_id = ?1",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    write_stock_status(conn, product_id, available, threshold).await
}

async fn write_stock_status(
    conn: &mut SqliteConnection,
    product_id: &str,
    available: i64,
    threshold: LowStockThreshold,
) -> Result<(), DbError> {
    let status = StockStatus::derive(available, threshold);
    debug!(product_id = %product_id, available, status = ?status, "Refreshing stock status");

    let result = sqlx::query(
        "UPDATE products SET available_quantity = ?2, stock_status = ?3, updated_at = ?4 WHERE id = ?1",
    )
    .bind(product_id)
    .bind(available)
    .bind(status)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product_id));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::catalog::tests::seed_product;
    use crate::repository::catalog::NewVariant;

    fn pooled(product_id: &str, quantity: i64) -> ReservationLine {
        ReservationLine {
            product_id: product_id.to_string(),
            variant_id: None,
            product_name: "Mug".to_string(),
            quantity,
        }
    }

    async fn seed_variant(db: &Database, product_id: &str, stock: i64) -> String {
        db.catalog()
            .insert_variant(
                product_id,
                &NewVariant {
                    sku: format!("{product_id}-V"),
                    name: "Default".to_string(),
                    price: None,
                    stock_quantity: stock,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pooled_line_spans_rows_most_available_first() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product_id = seed_product(&db, "MUG", 1000).await;
        db.catalog().insert_inventory_row(&product_id, "north", 2).await.unwrap();
        db.catalog().insert_inventory_row(&product_id, "south", 3).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        reserve_lines(&mut tx, &[pooled(&product_id, 4)], LowStockThreshold::default())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let rows = db.catalog().inventory_rows(&product_id).await.unwrap();
        let south = rows.iter().find(|r| r.location == "south").unwrap();
        let north = rows.iter().find(|r| r.location == "north").unwrap();
        assert_eq!((south.available_quantity, south.reserved_quantity), (0, 3));
        assert_eq!((north.available_quantity, north.reserved_quantity), (1, 1));

        let product = db.catalog().get_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.product.available_quantity, 1);
        assert_eq!(product.product.stock_status, StockStatus::LowStock);
    }

    #[tokio::test]
    async fn test_pooled_shortfall_fails_and_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product_id = seed_product(&db, "MUG", 1000).await;
        db.catalog().insert_inventory_row(&product_id, "north", 2).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let err = reserve_lines(&mut tx, &[pooled(&product_id, 3)], LowStockThreshold::default())
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(
            err,
            ReservationError::InsufficientStock { requested: 3, .. }
        ));
        let rows = db.catalog().inventory_rows(&product_id).await.unwrap();
        assert_eq!(rows[0].available_quantity, 2);
        assert_eq!(rows[0].reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_variant_guard_prevents_overselling() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product_id = seed_product(&db, "TEE", 1500).await;
        let variant_id = seed_variant(&db, &product_id, 2).await;
        let line = ReservationLine {
            product_id: product_id.clone(),
            variant_id: Some(variant_id.clone()),
            product_name: "Tee".to_string(),
            quantity: 2,
        };

        let mut conn = db.pool().acquire().await.unwrap();
        reserve_lines(&mut conn, &[line.clone()], LowStockThreshold::default())
            .await
            .unwrap();
        let err = reserve_lines(&mut conn, &[line], LowStockThreshold::default())
            .await
            .unwrap_err();
        drop(conn);

        assert!(matches!(err, ReservationError::InsufficientStock { .. }));
        let variant = db.catalog().get_variant(&variant_id).await.unwrap().unwrap();
        assert_eq!(variant.reserved_quantity, 2);
        assert_eq!(variant.available(), 0);

        let product = db.catalog().get_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.product.stock_status, StockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn test_failure_on_later_line_undoes_earlier_lines() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = seed_product(&db, "A", 100).await;
        let second = seed_product(&db, "B", 100).await;
        let third = seed_product(&db, "C", 100).await;
        db.catalog().insert_inventory_row(&first, "main", 5).await.unwrap();
        db.catalog().insert_inventory_row(&second, "main", 1).await.unwrap();
        db.catalog().insert_inventory_row(&third, "main", 5).await.unwrap();

        let lines = [pooled(&first, 2), pooled(&second, 2), pooled(&third, 2)];
        let mut tx = db.begin().await.unwrap();
        let result = reserve_lines(&mut tx, &lines, LowStockThreshold::default()).await;
        tx.rollback().await.unwrap();
        assert!(result.is_err());

        for product_id in [&first, &second, &third] {
            let rows = db.catalog().inventory_rows(product_id).await.unwrap();
            assert_eq!(rows[0].reserved_quantity, 0);
        }
        let first_row = &db.catalog().inventory_rows(&first).await.unwrap()[0];
        assert_eq!(first_row.available_quantity, 5);
    }
}
