//! # Catalog Repository
//!
//! The narrow catalog interface the engine needs:
//!
//! ```text
//! get_product(id) ──► { price, variants[], category_ids[] }
//!                        │            │            │
//!                        ▼            ▼            ▼
//!                   line pricing  stock path  discount category scope
//! ```
//!
//! Provisioning helpers (`insert_*`) exist for seeding and tests. They set
//! starting stock; reservations afterwards go through
//! [`crate::inventory`] only.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::inventory;
use crate::repository::settings::SettingsRepository;
use basket_core::{CatalogProduct, InventoryRow, Money, Product, ProductVariant};

const PRODUCT_COLUMNS: &str =
    "id, sku, name, price_cents, is_active, stock_status, available_quantity, created_at, updated_at";

const VARIANT_COLUMNS: &str =
    "id, product_id, sku, name, price_cents, stock_quantity, reserved_quantity, is_active";

/// Input for [`CatalogRepository::insert_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub price: Money,
}

/// Input for [`CatalogRepository::insert_variant`].
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub sku: String,
    pub name: String,
    /// `None` inherits the product price.
    pub price: Option<Money>,
    pub stock_quantity: i64,
}

/// Repository for catalog reads and provisioning.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Product with variants and category ids. Inactive products included.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<CatalogProduct>> {
        let mut conn = self.pool.acquire().await?;
        self.load_product(&mut conn, id).await
    }

    pub async fn load_product(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CatalogProduct>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = match sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        {
            Some(product) => product,
            None => return Ok(None),
        };

        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = ?1 ORDER BY sku"
        );
        let variants = sqlx::query_as::<_, ProductVariant>(&sql)
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

        let category_ids: Vec<String> = sqlx::query_scalar(
            "SELECT category_id FROM product_categories WHERE product_id = ?1 ORDER BY category_id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(CatalogProduct {
            product,
            variants,
            category_ids,
        }))
    }

    pub async fn get_variant(&self, id: &str) -> DbResult<Option<ProductVariant>> {
        let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = ?1");
        let variant = sqlx::query_as::<_, ProductVariant>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(variant)
    }

    /// Pooled stock rows for a product, most available first.
    pub async fn inventory_rows(&self, product_id: &str) -> DbResult<Vec<InventoryRow>> {
        let rows = sqlx::query_as::<_, InventoryRow>(
            r#"
            SELECT id, product_id, location, quantity, reserved_quantity,
                   available_quantity, updated_at
            FROM inventory
            WHERE product_id = ?1
            ORDER BY available_quantity DESC, updated_at DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Category membership for a set of products.
    ///
    /// Products without categories are absent from the map.
    pub async fn category_index(
        &self,
        conn: &mut SqliteConnection,
        product_ids: &[String],
    ) -> DbResult<HashMap<String, BTreeSet<String>>> {
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();
        if product_ids.is_empty() {
            return Ok(index);
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT product_id, category_id FROM product_categories WHERE product_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in product_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");

        let pairs = query
            .build_query_as::<(String, String)>()
            .fetch_all(&mut *conn)
            .await?;
        for (product_id, category_id) in pairs {
            index.entry(product_id).or_default().insert(category_id);
        }

        Ok(index)
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    pub async fn insert_category(&self, name: &str, slug: &str) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        debug!(id = %id, slug = %slug, "Inserting category");

        sqlx::query("INSERT INTO categories (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&id)
            .bind(name)
            .bind(slug)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    /// Inserts an active product with no stock yet.
    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        debug!(id = %id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, price_cents, is_active, stock_status, available_quantity,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 1, 'out_of_stock', 0, ?5, ?5)
            "#,
        )
        .bind(&id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn set_product_active(&self, id: &str, active: bool) -> DbResult<()> {
        sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn assign_category(&self, product_id: &str, category_id: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO product_categories (product_id, category_id) VALUES (?1, ?2)",
        )
        .bind(product_id)
        .bind(category_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Adds a variant with starting stock and refreshes the product's stock flag.
    pub async fn insert_variant(&self, product_id: &str, variant: &NewVariant) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        debug!(id = %id, product_id = %product_id, sku = %variant.sku, "Inserting variant");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO product_variants (
                id, product_id, sku, name, price_cents, stock_quantity, reserved_quantity,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(&variant.sku)
        .bind(&variant.name)
        .bind(variant.price.map(|p| p.cents()))
        .bind(variant.stock_quantity)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let threshold = SettingsRepository::low_stock_threshold(&mut *tx).await?;
        inventory::refresh_variant_stock(&mut *tx, product_id, threshold).await?;
        tx.commit().await?;

        Ok(id)
    }

    /// Adds a pooled stock row for a location and refreshes the product's stock flag.
    pub async fn insert_inventory_row(
        &self,
        product_id: &str,
        location: &str,
        quantity: i64,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        debug!(id = %id, product_id = %product_id, location = %location, quantity, "Inserting inventory row");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO inventory (
                id, product_id, location, quantity, reserved_quantity, available_quantity, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(product_id)
        .bind(location)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let threshold = SettingsRepository::low_stock_threshold(&mut *tx).await?;
        inventory::refresh_pooled_stock(&mut *tx, product_id, threshold).await?;
        tx.commit().await?;

        Ok(id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use basket_core::stock::StockStatus;

    /// Inserts an active product and returns its id.
    pub(crate) async fn seed_product(db: &Database, sku: &str, price_cents: i64) -> String {
        db.catalog()
            .insert_product(&NewProduct {
                sku: sku.to_string(),
                name: format!("Product {sku}"),
                price: Money::from_cents(price_cents),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_product_with_variants_and_categories() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        let product_id = seed_product(&db, "TEE", 1500).await;
        let category_id = catalog.insert_category("Apparel", "apparel").await.unwrap();
        catalog.assign_category(&product_id, &category_id).await.unwrap();
        catalog
            .insert_variant(
                &product_id,
                &NewVariant {
                    sku: "TEE-L".to_string(),
                    name: "Large".to_string(),
                    price: Some(Money::from_cents(1800)),
                    stock_quantity: 10,
                },
            )
            .await
            .unwrap();

        let product = catalog.get_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.category_ids, vec![category_id.clone()]);
        assert_eq!(product.product.available_quantity, 10);
        assert_eq!(product.product.stock_status, StockStatus::InStock);

        let mut conn = db.pool().acquire().await.unwrap();
        let index = catalog
            .category_index(&mut conn, &[product_id.clone(), "other".to_string()])
            .await
            .unwrap();
        assert!(index[&product_id].contains(&category_id));
        assert!(!index.contains_key("other"));
    }

    #[tokio::test]
    async fn test_inventory_rows_refresh_status() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product_id = seed_product(&db, "MUG", 1000).await;

        db.catalog()
            .insert_inventory_row(&product_id, "north", 2)
            .await
            .unwrap();
        let product = db.catalog().get_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.product.stock_status, StockStatus::LowStock);

        db.catalog()
            .insert_inventory_row(&product_id, "south", 10)
            .await
            .unwrap();
        let product = db.catalog().get_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.product.available_quantity, 12);
        assert_eq!(product.product.stock_status, StockStatus::InStock);

        let rows = db.catalog().inventory_rows(&product_id).await.unwrap();
        assert_eq!(rows[0].location, "south");
    }

    #[tokio::test]
    async fn test_missing_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.catalog().get_product("nope").await.unwrap().is_none());
    }
}
