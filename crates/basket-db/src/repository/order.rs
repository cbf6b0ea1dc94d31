//! # Order Repository
//!
//! Writes the order graph inside the checkout transaction and reads it back.
//! Orders are immutable here: there is no update path.
//!
//! ```text
//! orders ─┬─< order_items
//!         ├── order_shipping_addresses (0..1)
//!         └── order_discounts          (0..1, no FK to discounts)
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use basket_core::{Order, OrderDiscount, OrderItem, OrderShippingAddress};

const ORDER_COLUMNS: &str = "id, order_number, cart_id, user_id, status, payment_status, \
     payment_method, shipping_method, currency, subtotal_cents, tax_cents, shipping_cents, \
     discount_cents, total_cents, customer_email, customer_phone, created_at";

/// Repository for placed orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, variant_id, product_name, variant_name, sku,
                   unit_price_cents, quantity, total_price_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn get_discount(&self, order_id: &str) -> DbResult<Option<OrderDiscount>> {
        let discount = sqlx::query_as::<_, OrderDiscount>(
            r#"
            SELECT id, order_id, discount_id, code, discount_type, amount_cents
            FROM order_discounts
            WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(discount)
    }

    pub async fn get_shipping_address(&self, order_id: &str) -> DbResult<Option<OrderShippingAddress>> {
        let address = sqlx::query_as::<_, OrderShippingAddress>(
            r#"
            SELECT id, order_id, full_name, line1, line2, city, region, postal_code, country, phone
            FROM order_shipping_addresses
            WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(address)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Writes (checkout transaction)
    // =========================================================================

    pub async fn insert_order(&self, conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, number = %order.order_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, cart_id, user_id, status, payment_status,
                payment_method, shipping_method, currency, subtotal_cents, tax_cents,
                shipping_cents, discount_cents, total_cents, customer_email,
                customer_phone, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.cart_id)
        .bind(&order.user_id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .bind(&order.shipping_method)
        .bind(&order.currency)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.shipping_cents)
        .bind(order.discount_cents)
        .bind(order.total_cents)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&self, conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, variant_id, product_name, variant_name, sku,
                unit_price_cents, quantity, total_price_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.product_name)
        .bind(&item.variant_name)
        .bind(&item.sku)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.total_price_cents)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_shipping_address(
        &self,
        conn: &mut SqliteConnection,
        address: &OrderShippingAddress,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_shipping_addresses (
                id, order_id, full_name, line1, line2, city, region, postal_code, country, phone
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&address.id)
        .bind(&address.order_id)
        .bind(&address.full_name)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.region)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_discount(
        &self,
        conn: &mut SqliteConnection,
        discount: &OrderDiscount,
    ) -> DbResult<()> {
        if discount.amount_cents <= 0 {
            return Err(DbError::CheckViolation {
                message: "order discount amount must be positive".to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO order_discounts (id, order_id, discount_id, code, discount_type, amount_cents)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&discount.id)
        .bind(&discount.order_id)
        .bind(&discount.discount_id)
        .bind(&discount.code)
        .bind(discount.discount_type)
        .bind(discount.amount_cents)
        .execute(&mut *conn)
        .await?;

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
    use basket_core::discount::DiscountType;
    use basket_core::{OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
    use chrono::Utc;

    fn order(id: &str, number: &str, discount_cents: i64) -> Order {
        Order {
            id: id.to_string(),
            order_number: number.to_string(),
            cart_id: "cart-1".to_string(),
            user_id: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Card,
            shipping_method: "standard".to_string(),
            currency: "USD".to_string(),
            subtotal_cents: 3000,
            tax_cents: 0,
            shipping_cents: 0,
            discount_cents,
            total_cents: 3000 - discount_cents,
            customer_email: None,
            customer_phone: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_order_graph_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.orders();

        let mut tx = db.begin().await.unwrap();
        repo.insert_order(&mut tx, &order("o-1", "ORD-000001", 300)).await.unwrap();
        repo.insert_item(
            &mut tx,
            &OrderItem {
                id: "oi-1".to_string(),
                order_id: "o-1".to_string(),
                product_id: "p-1".to_string(),
                variant_id: None,
                product_name: "Mug".to_string(),
                variant_name: None,
                sku: "MUG".to_string(),
                unit_price_cents: 1000,
                quantity: 3,
                total_price_cents: 3000,
            },
        )
        .await
        .unwrap();
        let address = ShippingAddress {
            full_name: "Sam Doe".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            region: None,
            postal_code: "12345".to_string(),
            country: "US".to_string(),
            phone: None,
        };
        repo.insert_shipping_address(
            &mut tx,
            &OrderShippingAddress::snapshot("a-1".to_string(), "o-1", &address),
        )
        .await
        .unwrap();
        repo.insert_discount(
            &mut tx,
            &OrderDiscount {
                id: "od-1".to_string(),
                order_id: "o-1".to_string(),
                discount_id: "d-1".to_string(),
                code: None,
                discount_type: DiscountType::Percentage,
                amount_cents: 300,
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stored = repo.get_by_id("o-1").await.unwrap().unwrap();
        assert_eq!(stored.total_cents, 2700);
        assert!(stored.totals().is_consistent());
        assert_eq!(repo.get_items("o-1").await.unwrap().len(), 1);
        assert_eq!(repo.get_discount("o-1").await.unwrap().unwrap().amount_cents, 300);
        assert_eq!(
            repo.get_shipping_address("o-1").await.unwrap().unwrap().city,
            "Springfield"
        );
        assert!(repo.get_by_number("ORD-000001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_inconsistent_totals_rejected_by_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut broken = order("o-2", "ORD-000002", 0);
        broken.total_cents = 1;

        let mut conn = db.pool().acquire().await.unwrap();
        let err = db.orders().insert_order(&mut conn, &broken).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
        drop(conn);
        assert_eq!(db.orders().count().await.unwrap(), 0);
    }
}
