//! # Cart Repository
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create ──► active ──┬── items added / updated / removed (recomputed)  │
//! │                      │                                                  │
//! │                      ├── merged into user cart ──► abandoned           │
//! │                      │                               merged_into = id   │
//! │                      │                                                  │
//! │                      └── order placed ──► converted, items cleared     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutating unit of work starts with [`CartRepository::claim`]: a
//! write to the cart row that takes SQLite's write lock before anything is
//! read, so the reads that follow see the latest committed state.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use basket_core::{Cart, CartItem, CartOwner, CartStatus, CartTotals};

const CART_COLUMNS: &str = "id, user_id, session_key, status, subtotal_cents, tax_cents, \
     shipping_cents, discount_cents, total_cents, discount_id, discount_code, merged_into, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, cart_id, product_id, variant_id, product_name, variant_name, \
     sku, unit_price_cents, quantity, total_price_cents, created_at, updated_at";

/// Repository for carts and cart lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        self.fetch(&mut conn, id).await
    }

    /// Lines in insertion order.
    pub async fn get_items(&self, cart_id: &str) -> DbResult<Vec<CartItem>> {
        let mut conn = self.pool.acquire().await?;
        self.items(&mut conn, cart_id).await
    }

    pub async fn find_item(&self, item_id: &str) -> DbResult<Option<CartItem>> {
        let mut conn = self.pool.acquire().await?;
        self.item(&mut conn, item_id).await
    }

    pub async fn item(&self, conn: &mut SqliteConnection, item_id: &str) -> DbResult<Option<CartItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM cart_items WHERE id = ?1");
        let item = sqlx::query_as::<_, CartItem>(&sql)
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(item)
    }

    /// The owner's most recently touched active cart.
    pub async fn find_active_for_owner(&self, owner: &CartOwner) -> DbResult<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        self.active_for_owner(&mut conn, owner).await
    }

    pub async fn active_for_owner(
        &self,
        conn: &mut SqliteConnection,
        owner: &CartOwner,
    ) -> DbResult<Option<Cart>> {
        let (column, key) = match owner {
            CartOwner::User(id) => ("user_id", id),
            CartOwner::Session(key) => ("session_key", key),
        };
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE {column} = ?1 AND status = 'active' \
             ORDER BY updated_at DESC LIMIT 1"
        );

        let cart = sqlx::query_as::<_, Cart>(&sql)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(cart)
    }

    pub async fn fetch(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Cart>> {
        let sql = format!("SELECT {CART_COLUMNS} FROM carts WHERE id = ?1");
        let cart = sqlx::query_as::<_, Cart>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(cart)
    }

    pub async fn items(&self, conn: &mut SqliteConnection, cart_id: &str) -> DbResult<Vec<CartItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = ?1 ORDER BY created_at, id"
        );
        let items = sqlx::query_as::<_, CartItem>(&sql)
            .bind(cart_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(items)
    }

    /// The line for a product/variant pair, if the cart already has one.
    pub async fn find_line(
        &self,
        conn: &mut SqliteConnection,
        cart_id: &str,
        product_id: &str,
        variant_id: Option<&str>,
    ) -> DbResult<Option<CartItem>> {
        // IS compares NULL variant ids as equal
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items \
             WHERE cart_id = ?1 AND product_id = ?2 AND variant_id IS ?3"
        );
        let item = sqlx::query_as::<_, CartItem>(&sql)
            .bind(cart_id)
            .bind(product_id)
            .bind(variant_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(item)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Creates an empty active cart for an owner.
    pub async fn create(&self, owner: &CartOwner) -> DbResult<Cart> {
        let mut conn = self.pool.acquire().await?;
        self.insert(&mut conn, owner).await
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, owner: &CartOwner) -> DbResult<Cart> {
        let now = Utc::now();
        let (user_id, session_key) = match owner {
            CartOwner::User(id) => (Some(id.clone()), None),
            CartOwner::Session(key) => (None, Some(key.clone())),
        };
        let cart = Cart {
            id: Uuid::new_v4().to_string(),
            user_id,
            session_key,
            status: CartStatus::Active,
            subtotal_cents: 0,
            tax_cents: 0,
            shipping_cents: 0,
            discount_cents: 0,
            total_cents: 0,
            discount_id: None,
            discount_code: None,
            merged_into: None,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %cart.id, "Creating cart");

        sqlx::query(
            r#"
            INSERT INTO carts (
                id, user_id, session_key, status,
                subtotal_cents, tax_cents, shipping_cents, discount_cents, total_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, 0, 0, 0, 0, ?5, ?6)
            "#,
        )
        .bind(&cart.id)
        .bind(&cart.user_id)
        .bind(&cart.session_key)
        .bind(cart.status)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(cart)
    }

    /// Takes the write lock for an active cart and returns its current row.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - no such cart, or it is no longer active
    pub async fn claim(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Cart> {
        debug!(id = %id, "Claiming cart");

        let result = sqlx::query(
            "UPDATE carts SET updated_at = ?2 WHERE id = ?1 AND status = 'active'",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart", id));
        }

        self.fetch(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Cart", id))
    }

    pub async fn insert_item(&self, conn: &mut SqliteConnection, item: &CartItem) -> DbResult<()> {
        debug!(id = %item.id, cart_id = %item.cart_id, product_id = %item.product_id, "Inserting cart item");

        sqlx::query(
            r#"
            INSERT INTO cart_items (
                id, cart_id, product_id, variant_id, product_name, variant_name, sku,
                unit_price_cents, quantity, total_price_cents, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.cart_id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.product_name)
        .bind(&item.variant_name)
        .bind(&item.sku)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.total_price_cents)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Sets a line's quantity and recomputes its total from the stored unit price.
    pub async fn set_item_quantity(
        &self,
        conn: &mut SqliteConnection,
        item_id: &str,
        quantity: i64,
    ) -> DbResult<()> {
        debug!(id = %item_id, quantity, "Updating cart item quantity");

        let result = sqlx::query(
            r#"
            UPDATE cart_items
            SET quantity = ?2, total_price_cents = unit_price_cents * ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CartItem", item_id));
        }

        Ok(())
    }

    pub async fn delete_item(&self, conn: &mut SqliteConnection, item_id: &str) -> DbResult<()> {
        debug!(id = %item_id, "Deleting cart item");

        let result = sqlx::query("DELETE FROM cart_items WHERE id = ?1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CartItem", item_id));
        }

        Ok(())
    }

    /// Removes every line from a cart.
    pub async fn clear_items(&self, conn: &mut SqliteConnection, cart_id: &str) -> DbResult<u64> {
        debug!(cart_id = %cart_id, "Clearing cart items");

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Persists a monetary snapshot.
    pub async fn save_totals(
        &self,
        conn: &mut SqliteConnection,
        cart_id: &str,
        totals: &CartTotals,
    ) -> DbResult<()> {
        debug!(
            cart_id = %cart_id,
            subtotal = totals.subtotal.cents(),
            discount = totals.discount.cents(),
            total = totals.total.cents(),
            "Saving cart totals"
        );

        let result = sqlx::query(
            r#"
            UPDATE carts
            SET subtotal_cents = ?2, tax_cents = ?3, shipping_cents = ?4,
                discount_cents = ?5, total_cents = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(cart_id)
        .bind(totals.subtotal.cents())
        .bind(totals.tax.cents())
        .bind(totals.shipping.cents())
        .bind(totals.discount.cents())
        .bind(totals.total.cents())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart", cart_id));
        }

        Ok(())
    }

    /// Records (or with `None`, clears) the explicitly applied discount.
    pub async fn set_applied_discount(
        &self,
        conn: &mut SqliteConnection,
        cart_id: &str,
        discount_id: Option<&str>,
        code: Option<&str>,
    ) -> DbResult<()> {
        debug!(cart_id = %cart_id, discount_id = ?discount_id, "Setting applied discount");

        sqlx::query(
            "UPDATE carts SET discount_id = ?2, discount_code = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(cart_id)
        .bind(discount_id)
        .bind(code)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Marks a cart as turned into an order and zeroes its snapshot.
    pub async fn mark_converted(&self, conn: &mut SqliteConnection, cart_id: &str) -> DbResult<()> {
        debug!(cart_id = %cart_id, "Marking cart converted");

        sqlx::query(
            r#"
            UPDATE carts
            SET status = 'converted',
                subtotal_cents = 0, tax_cents = 0, shipping_cents = 0,
                discount_cents = 0, total_cents = 0,
                discount_id = NULL, discount_code = NULL,
                updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(cart_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Supersedes a guest cart that was folded into `into_cart_id`.
    pub async fn mark_merged(
        &self,
        conn: &mut SqliteConnection,
        cart_id: &str,
        into_cart_id: &str,
    ) -> DbResult<()> {
        debug!(cart_id = %cart_id, into = %into_cart_id, "Marking cart merged");

        sqlx::query(
            r#"
            UPDATE carts
            SET status = 'abandoned', merged_into = ?2,
                subtotal_cents = 0, tax_cents = 0, shipping_cents = 0,
                discount_cents = 0, total_cents = 0,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(cart_id)
        .bind(into_cart_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
