//! # Cart Operations
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open_cart(owner) ──► active cart                                       │
//! │                          │                                              │
//! │          add_item / update_item_quantity / remove_item                  │
//! │          apply_discount / clear_discount / set_charges                  │
//! │                          │   each: claim ─► mutate ─► recalculate       │
//! │                          │         ─► commit (one transaction)          │
//! │                          ▼                                              │
//! │  merge_guest_cart ──► guest cart abandoned, lines moved to user cart    │
//! │  place_order (checkout.rs) ──► converted                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Prices are frozen on the line when it is added; later catalog price
//! changes do not reach existing lines.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use basket_core::discount::DiscountCode;
use basket_core::evaluator::{evaluate, PricedLine};
use basket_core::validation::{
    ensure_cart_capacity, validate_charge_cents, validate_id, validate_quantity,
    validate_session_key,
};
use basket_core::{Cart, CartItem, CartOwner, CoreError, Money, MAX_ITEM_QUANTITY};
use basket_db::{Database, DbError};

use crate::error::EngineResult;
use crate::pricing::{recalculate, CartSnapshot};

/// Cart mutations. Every mutation recalculates and persists totals.
#[derive(Debug, Clone)]
pub struct CartService {
    db: Database,
}

impl CartService {
    pub fn new(db: Database) -> Self {
        CartService { db }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The cart with its lines, totals and the discount it earns right now.
    ///
    /// Active carts are repriced and saved in a claimed transaction so the
    /// stored totals and the returned discount always agree. Carts that
    /// are no longer active come back as stored.
    pub async fn get_cart(&self, cart_id: &str) -> EngineResult<CartSnapshot> {
        validate_id("cart_id", cart_id)?;

        let carts = self.db.carts();
        let stored = carts
            .get_by_id(cart_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Cart", cart_id))?;
        if !stored.is_active() {
            return Ok(CartSnapshot {
                items: carts.get_items(cart_id).await?,
                cart: stored,
                discount: None,
                free_shipping: false,
            });
        }

        let mut tx = self.db.begin().await?;
        let cart = carts.claim(&mut tx, cart_id).await?;
        let snapshot = recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    /// Returns the owner's active cart, creating an empty one if needed.
    ///
    /// The store allows one active cart per owner; a concurrent open that
    /// loses the insert picks up the winner's cart.
    pub async fn open_cart(&self, owner: &CartOwner) -> EngineResult<CartSnapshot> {
        match owner {
            CartOwner::User(id) => validate_id("user_id", id)?,
            CartOwner::Session(key) => validate_session_key(key)?,
        }

        let carts = self.db.carts();
        let cart = match carts.find_active_for_owner(owner).await? {
            Some(cart) => cart,
            None => match carts.create(owner).await {
                Ok(cart) => {
                    info!(cart_id = %cart.id, "Cart opened");
                    cart
                }
                Err(DbError::UniqueViolation { .. }) => {
                    debug!(owner = ?owner, "Active cart created concurrently");
                    carts
                        .find_active_for_owner(owner)
                        .await?
                        .ok_or_else(|| DbError::not_found("Cart", "active"))?
                }
                Err(err) => return Err(err.into()),
            },
        };

        self.get_cart(&cart.id).await
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Adds a product (or one of its variants) to the cart.
    ///
    /// An existing line for the same product/variant grows by `quantity`.
    pub async fn add_item(
        &self,
        cart_id: &str,
        product_id: &str,
        variant_id: Option<&str>,
        quantity: i64,
    ) -> EngineResult<CartSnapshot> {
        validate_id("cart_id", cart_id)?;
        validate_id("product_id", product_id)?;
        if let Some(variant_id) = variant_id {
            validate_id("variant_id", variant_id)?;
        }
        validate_quantity(quantity)?;
        debug!(cart_id = %cart_id, product_id = %product_id, variant_id = ?variant_id, quantity, "add_item");

        let carts = self.db.carts();
        let mut tx = self.db.begin().await?;
        let cart = carts.claim(&mut tx, cart_id).await?;

        let product = self
            .db
            .catalog()
            .load_product(&mut tx, product_id)
            .await?
            .filter(|p| p.product.is_active)
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;

        let variant = match variant_id {
            Some(id) => Some(
                product
                    .variant(id)
                    .filter(|v| v.is_active)
                    .ok_or_else(|| CoreError::not_found("ProductVariant", id))?,
            ),
            None => None,
        };

        match carts.find_line(&mut tx, cart_id, product_id, variant_id).await? {
            Some(line) => {
                let new_quantity = line.quantity + quantity;
                validate_quantity(new_quantity)?;
                carts.set_item_quantity(&mut tx, &line.id, new_quantity).await?;
            }
            None => {
                let lines = carts.items(&mut tx, cart_id).await?;
                ensure_cart_capacity(lines.len())?;

                let unit_price = product.unit_price(variant);
                let now = Utc::now();
                let item = CartItem {
                    id: Uuid::new_v4().to_string(),
                    cart_id: cart_id.to_string(),
                    product_id: product_id.to_string(),
                    variant_id: variant.map(|v| v.id.clone()),
                    product_name: product.product.name.clone(),
                    variant_name: variant.map(|v| v.name.clone()),
                    sku: variant
                        .map(|v| v.sku.clone())
                        .unwrap_or_else(|| product.product.sku.clone()),
                    unit_price_cents: unit_price.cents(),
                    quantity,
                    total_price_cents: unit_price.multiply_quantity(quantity).cents(),
                    created_at: now,
                    updated_at: now,
                };
                carts.insert_item(&mut tx, &item).await?;
            }
        }

        let snapshot = recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;

        info!(cart_id = %cart_id, total = %snapshot.cart.totals().total, "Item added to cart");
        Ok(snapshot)
    }

    /// Sets a line's quantity. Returns the cart id.
    pub async fn update_item_quantity(&self, item_id: &str, quantity: i64) -> EngineResult<String> {
        validate_id("item_id", item_id)?;
        validate_quantity(quantity)?;
        debug!(item_id = %item_id, quantity, "update_item_quantity");

        let cart_id = self.cart_of_item(item_id).await?;
        let carts = self.db.carts();
        let mut tx = self.db.begin().await?;
        let cart = carts.claim(&mut tx, &cart_id).await?;
        Self::ensure_line(&mut tx, &self.db, &cart, item_id).await?;

        carts.set_item_quantity(&mut tx, item_id, quantity).await?;
        recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;

        info!(cart_id = %cart_id, item_id = %item_id, quantity, "Cart item updated");
        Ok(cart_id)
    }

    /// Removes a line. Returns the cart id.
    pub async fn remove_item(&self, item_id: &str) -> EngineResult<String> {
        validate_id("item_id", item_id)?;
        debug!(item_id = %item_id, "remove_item");

        let cart_id = self.cart_of_item(item_id).await?;
        let carts = self.db.carts();
        let mut tx = self.db.begin().await?;
        let cart = carts.claim(&mut tx, &cart_id).await?;
        Self::ensure_line(&mut tx, &self.db, &cart, item_id).await?;

        carts.delete_item(&mut tx, item_id).await?;
        recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;

        info!(cart_id = %cart_id, item_id = %item_id, "Cart item removed");
        Ok(cart_id)
    }

    async fn cart_of_item(&self, item_id: &str) -> EngineResult<String> {
        let item = self
            .db
            .carts()
            .find_item(item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("CartItem", item_id))?;
        Ok(item.cart_id)
    }

    /// The line must still exist on the claimed cart.
    async fn ensure_line(
        conn: &mut SqliteConnection,
        db: &Database,
        cart: &Cart,
        item_id: &str,
    ) -> EngineResult<()> {
        match db.carts().item(conn, item_id).await? {
            Some(item) if item.cart_id == cart.id => Ok(()),
            _ => Err(CoreError::not_found("CartItem", item_id).into()),
        }
    }

    // =========================================================================
    // Discounts
    // =========================================================================

    /// Applies a discount code.
    ///
    /// ## Errors
    /// * `NotFound` - no discount with this code
    /// * `InapplicableDiscount` - inactive, outside its window, collection
    ///   scope, usage exhausted, or worth nothing for the current lines.
    ///   The cart is left unchanged.
    pub async fn apply_discount(&self, cart_id: &str, code: &str) -> EngineResult<CartSnapshot> {
        validate_id("cart_id", cart_id)?;
        let code = DiscountCode::parse(code)?;
        debug!(cart_id = %cart_id, code = %code, "apply_discount");

        let carts = self.db.carts();
        let mut tx = self.db.begin().await?;
        carts.claim(&mut tx, cart_id).await?;

        let discount = self
            .db
            .discounts()
            .find_by_code(&mut tx, &code)
            .await?
            .ok_or_else(|| CoreError::not_found("Discount", code.as_str()))?;

        let now = Utc::now();
        discount
            .check_eligible(now)
            .map_err(|reason| CoreError::inapplicable(code.as_str(), reason))?;

        let items = carts.items(&mut tx, cart_id).await?;
        let lines: Vec<PricedLine> = items.iter().map(CartItem::priced_line).collect();
        let product_ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
        let categories = self
            .db
            .catalog()
            .category_index(&mut tx, &product_ids)
            .await?;

        let evaluation = evaluate(&lines, &discount, &categories);
        if let Some(reason) = evaluation.rejection {
            return Err(CoreError::inapplicable(code.as_str(), reason).into());
        }

        carts
            .set_applied_discount(&mut tx, cart_id, Some(&discount.id), Some(code.as_str()))
            .await?;
        let cart = carts
            .fetch(&mut tx, cart_id)
            .await?
            .ok_or_else(|| DbError::not_found("Cart", cart_id))?;
        let snapshot = recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;

        info!(
            cart_id = %cart_id,
            code = %code,
            discount = %snapshot.cart.totals().discount,
            "Discount applied"
        );
        Ok(snapshot)
    }

    /// Drops the applied discount. Automatic discounts still apply.
    pub async fn clear_discount(&self, cart_id: &str) -> EngineResult<CartSnapshot> {
        validate_id("cart_id", cart_id)?;
        debug!(cart_id = %cart_id, "clear_discount");

        let carts = self.db.carts();
        let mut tx = self.db.begin().await?;
        let mut cart = carts.claim(&mut tx, cart_id).await?;

        carts.set_applied_discount(&mut tx, cart_id, None, None).await?;
        cart.discount_id = None;
        cart.discount_code = None;
        let snapshot = recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;

        info!(cart_id = %cart_id, "Discount cleared");
        Ok(snapshot)
    }

    // =========================================================================
    // Charges & Merging
    // =========================================================================

    /// Records pre-computed tax and shipping and recomputes the total.
    pub async fn set_charges(
        &self,
        cart_id: &str,
        tax: Money,
        shipping: Money,
    ) -> EngineResult<CartSnapshot> {
        validate_id("cart_id", cart_id)?;
        validate_charge_cents("tax", tax.cents())?;
        validate_charge_cents("shipping", shipping.cents())?;

        let mut tx = self.db.begin().await?;
        let mut cart = self.db.carts().claim(&mut tx, cart_id).await?;
        cart.tax_cents = tax.cents();
        cart.shipping_cents = shipping.cents();

        let snapshot = recalculate(&self.db, &mut tx, &cart).await?;
        tx.commit().await?;

        info!(cart_id = %cart_id, tax = %tax, shipping = %shipping, "Cart charges updated");
        Ok(snapshot)
    }

    /// Moves a guest cart's lines into the user's active cart.
    ///
    /// Matching product/variant lines are summed (capped at
    /// [`MAX_ITEM_QUANTITY`]). The guest cart is kept as `abandoned` with a
    /// reference to the cart it went into. The guest's applied code is
    /// not carried over.
    pub async fn merge_guest_cart(&self, session_key: &str, user_id: &str) -> EngineResult<CartSnapshot> {
        validate_session_key(session_key)?;
        validate_id("user_id", user_id)?;

        let carts = self.db.carts();
        let guest_owner = CartOwner::Session(session_key.to_string());
        let guest = carts
            .find_active_for_owner(&guest_owner)
            .await?
            .ok_or_else(|| CoreError::not_found("Cart", session_key))?;

        let mut tx = self.db.begin().await?;
        let guest = carts.claim(&mut tx, &guest.id).await?;

        let user_owner = CartOwner::User(user_id.to_string());
        let target = match carts.active_for_owner(&mut tx, &user_owner).await? {
            Some(cart) => carts.claim(&mut tx, &cart.id).await?,
            None => carts.insert(&mut tx, &user_owner).await?,
        };

        let guest_items = carts.items(&mut tx, &guest.id).await?;
        let mut line_count = carts.items(&mut tx, &target.id).await?.len();
        for item in &guest_items {
            let existing = carts
                .find_line(&mut tx, &target.id, &item.product_id, item.variant_id.as_deref())
                .await?;
            match existing {
                Some(line) => {
                    let quantity = (line.quantity + item.quantity).min(MAX_ITEM_QUANTITY);
                    carts.set_item_quantity(&mut tx, &line.id, quantity).await?;
                }
                None => {
                    ensure_cart_capacity(line_count)?;
                    let now = Utc::now();
                    let moved = CartItem {
                        id: Uuid::new_v4().to_string(),
                        cart_id: target.id.clone(),
                        created_at: now,
                        updated_at: now,
                        ..item.clone()
                    };
                    carts.insert_item(&mut tx, &moved).await?;
                    line_count += 1;
                }
            }
        }

        carts.clear_items(&mut tx, &guest.id).await?;
        carts.mark_merged(&mut tx, &guest.id, &target.id).await?;
        let snapshot = recalculate(&self.db, &mut tx, &target).await?;
        tx.commit().await?;

        info!(
            guest_cart_id = %guest.id,
            cart_id = %target.id,
            moved = guest_items.len(),
            "Guest cart merged"
        );
        Ok(snapshot)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
