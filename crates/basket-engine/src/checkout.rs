//! # Order Placement
//!
//! Turns a cart into an order in one transaction.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate request, cart exists and has lines                            │
//! │  mint order number (own statement, before the transaction)              │
//! │                                                                         │
//! │  BEGIN ─────────────────────────────────────────────────────────────┐   │
//! │  │ claim cart (write lock)                                          │   │
//! │  │ reprice: select discount now, not from the saved snapshot        │   │
//! │  │ usage limit re-read; exhausted ──► discount dropped, no error    │   │
//! │  │ reserve every line ──► InsufficientStock aborts everything       │   │
//! │  │ insert order, address snapshot, order items (copied verbatim)    │   │
//! │  │ discount > 0: insert snapshot                                    │   │
//! │  │   SAVEPOINT usage + 1 ──► failure rolled back to savepoint only  │   │
//! │  │ clear cart lines, mark cart converted                            │   │
//! │  COMMIT ────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  tokio::spawn ──► notify admins (+ purchaser if signed in, not admin)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use basket_core::validation::{
    validate_email, validate_id, validate_phone, validate_shipping_address,
    validate_shipping_method,
};
use basket_core::{
    CoreError, Ignorable, Money, Order, OrderDiscount, OrderItem, OrderShippingAddress,
    OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress,
};
use basket_db::{reserve_lines, Database, DbError, ReservationLine, SettingsRepository, UserRepository};

use crate::error::EngineResult;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::pricing::price_cart;

const USAGE_STEP: &str = "discount usage increment";

/// Input to [`CheckoutService::place_order`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub cart_id: String,
    pub shipping_address: Option<ShippingAddress>,
    pub shipping_method: String,
    pub payment_method: PaymentMethod,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl PlaceOrderRequest {
    fn validate(&self) -> EngineResult<()> {
        validate_id("cart_id", &self.cart_id)?;
        validate_shipping_method(&self.shipping_method)?;
        if let Some(address) = &self.shipping_address {
            validate_shipping_address(address)?;
        }
        if let Some(email) = &self.customer_email {
            validate_email(email)?;
        }
        if let Some(phone) = &self.customer_phone {
            validate_phone("customer_phone", phone)?;
        }
        Ok(())
    }
}

/// What a successful checkout returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: String,
    pub order_number: String,
}

/// A stored order with everything snapshotted alongside it.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub discount: Option<OrderDiscount>,
    pub shipping_address: Option<OrderShippingAddress>,
}

/// Facts the post-commit notifications need.
#[derive(Debug, Clone)]
struct PlacedSummary {
    order_id: String,
    order_number: String,
    total: Money,
    user_id: Option<String>,
}

/// Checkout and order reads.
#[derive(Clone)]
pub struct CheckoutService {
    db: Database,
    notifier: Arc<dyn Notifier>,
    order_prefix: String,
}

impl CheckoutService {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, order_prefix: impl Into<String>) -> Self {
        CheckoutService {
            db,
            notifier,
            order_prefix: order_prefix.into(),
        }
    }

    /// Places an order for a cart.
    ///
    /// ## Errors
    /// * `Validation` - malformed request; nothing touched
    /// * `NotFound` - no active cart with this id
    /// * `EmptyCart` - the cart has no lines
    /// * `InsufficientStock` - a line could not be reserved; nothing persisted
    pub async fn place_order(&self, request: PlaceOrderRequest) -> EngineResult<OrderPlaced> {
        request.validate()?;
        let cart_id = request.cart_id.as_str();
        debug!(cart_id = %cart_id, "place_order");

        let carts = self.db.carts();
        let cart = carts
            .get_by_id(cart_id)
            .await?
            .filter(|c| c.is_active())
            .ok_or_else(|| CoreError::not_found("Cart", cart_id))?;
        if carts.get_items(cart_id).await?.is_empty() {
            return Err(CoreError::EmptyCart {
                cart_id: cart.id.clone(),
            }
            .into());
        }

        let order_number = self
            .db
            .sequences()
            .next_document_number(&self.order_prefix)
            .await?;

        let mut tx = self.db.begin().await?;
        let cart = carts.claim(&mut tx, cart_id).await?;
        let now = Utc::now();
        let pricing = price_cart(&self.db, &mut tx, &cart, now).await?;
        if pricing.items.is_empty() {
            return Err(CoreError::EmptyCart { cart_id: cart.id }.into());
        }

        let mut selected = pricing.selection.selected;
        if let Some(discount) = &selected {
            if !self.usage_allows(&mut tx, &discount.discount_id).await? {
                warn!(
                    cart_id = %cart_id,
                    discount_id = %discount.discount_id,
                    "Discount usage limit reached at checkout, dropping discount"
                );
                selected = None;
            }
        }
        let discount_amount = selected.as_ref().map(|d| d.amount).unwrap_or_else(Money::zero);
        let totals = basket_core::CartTotals::for_items(
            &pricing.items,
            cart.tax(),
            cart.shipping(),
            discount_amount,
        );

        let threshold = SettingsRepository::low_stock_threshold(&mut tx).await?;
        let lines: Vec<ReservationLine> = pricing
            .items
            .iter()
            .map(ReservationLine::from_cart_item)
            .collect();
        reserve_lines(&mut tx, &lines, threshold).await?;

        let orders = self.db.orders();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: order_number.clone(),
            cart_id: cart.id.clone(),
            user_id: cart.user_id.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            shipping_method: request.shipping_method.trim().to_string(),
            currency: SettingsRepository::currency(&mut tx).await?,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            customer_email: request.customer_email.as_deref().map(|e| e.trim().to_lowercase()),
            customer_phone: request.customer_phone.as_deref().map(|p| p.trim().to_string()),
            created_at: now,
        };
        orders.insert_order(&mut tx, &order).await?;

        if let Some(address) = &request.shipping_address {
            let snapshot = OrderShippingAddress::snapshot(Uuid::new_v4().to_string(), &order.id, address);
            orders.insert_shipping_address(&mut tx, &snapshot).await?;
        }

        for item in &pricing.items {
            let line = OrderItem::from_cart_item(Uuid::new_v4().to_string(), &order.id, item);
            orders.insert_item(&mut tx, &line).await?;
        }

        if let Some(discount) = selected.filter(|d| d.amount.is_positive()) {
            orders
                .insert_discount(
                    &mut tx,
                    &OrderDiscount {
                        id: Uuid::new_v4().to_string(),
                        order_id: order.id.clone(),
                        discount_id: discount.discount_id.clone(),
                        code: discount.code.clone(),
                        discount_type: discount.discount_type,
                        amount_cents: discount.amount.cents(),
                    },
                )
                .await?;

            if let Err(ignored) = self.consume_usage(&mut tx, &discount.discount_id).await {
                warn!(
                    order_id = %order.id,
                    discount_id = %discount.discount_id,
                    error = %ignored,
                    "Discount usage not recorded"
                );
            }
        }

        carts.clear_items(&mut tx, &cart.id).await?;
        carts.mark_converted(&mut tx, &cart.id).await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %totals.total,
            lines = pricing.items.len(),
            "Order placed"
        );

        self.dispatch_notifications(PlacedSummary {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            total: totals.total,
            user_id: order.user_id.clone(),
        });

        Ok(OrderPlaced {
            order_id: order.id,
            order_number: order.order_number,
        })
    }

    /// Reads an order back with its snapshots.
    pub async fn get_order(&self, order_id: &str) -> EngineResult<OrderReceipt> {
        validate_id("order_id", order_id)?;

        let orders = self.db.orders();
        let order = orders
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))?;

        Ok(OrderReceipt {
            items: orders.get_items(order_id).await?,
            discount: orders.get_discount(order_id).await?,
            shipping_address: orders.get_shipping_address(order_id).await?,
            order,
        })
    }

    async fn usage_allows(&self, conn: &mut SqliteConnection, discount_id: &str) -> EngineResult<bool> {
        let usage = self.db.discounts().usage(conn, discount_id).await?;
        Ok(usage.is_some_and(|u| !u.is_exhausted()))
    }

    /// Adds one use inside a savepoint. A failure undoes only the savepoint.
    async fn consume_usage(
        &self,
        conn: &mut SqliteConnection,
        discount_id: &str,
    ) -> Result<(), Ignorable<DbError>> {
        let ignorable = |err: DbError| Ignorable::new(USAGE_STEP, err);

        let mut savepoint = conn.begin().await.map_err(|e| ignorable(e.into()))?;
        match self.db.discounts().increment_usage(&mut savepoint, discount_id).await {
            Ok(true) => savepoint.commit().await.map_err(|e| ignorable(e.into())),
            Ok(false) => {
                savepoint.rollback().await.map_err(|e| ignorable(e.into()))?;
                Err(ignorable(DbError::CheckViolation {
                    message: "usage limit reached".to_string(),
                }))
            }
            Err(err) => {
                if let Err(rollback) = savepoint.rollback().await {
                    warn!(error = %rollback, "Savepoint rollback failed");
                }
                Err(ignorable(err))
            }
        }
    }

    fn dispatch_notifications(&self, summary: PlacedSummary) {
        let users = self.db.users();
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notify_order_placed(users, notifier, summary).await;
        });
    }
}

async fn notify_order_placed(users: UserRepository, notifier: Arc<dyn Notifier>, summary: PlacedSummary) {
    let admins = match users.admin_ids().await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(error = %Ignorable::new("admin lookup", err), "Admin order notification skipped");
            Vec::new()
        }
    };

    let metadata = serde_json::json!({
        "order_id": summary.order_id,
        "order_number": summary.order_number,
        "total": summary.total.to_decimal_string(),
    });
    let action_url = Some(format!("/orders/{}", summary.order_id));

    let mut notifications = Vec::with_capacity(2);
    if !admins.is_empty() {
        notifications.push(Notification {
            kind: NotificationKind::OrderPlaced,
            title: "New order".to_string(),
            message: format!("Order {} was placed ({})", summary.order_number, summary.total),
            action_url: action_url.clone(),
            metadata: metadata.clone(),
            recipients: admins.clone(),
        });
    }
    if let Some(user_id) = summary.user_id.filter(|id| !admins.contains(id)) {
        notifications.push(Notification {
            kind: NotificationKind::OrderConfirmation,
            title: "Order confirmed".to_string(),
            message: format!("Your order {} has been received", summary.order_number),
            action_url,
            metadata,
            recipients: vec![user_id],
        });
    }

    for notification in notifications {
        let kind = notification.kind;
        if let Err(ignored) = notifier.notify(notification) {
            warn!(kind = kind.as_str(), error = %ignored, "Notification dropped");
        }
    }
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("order_prefix", &self.order_prefix)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartService;
    use crate::error::EngineError;
    use crate::notify::ChannelNotifier;
    use basket_core::stock::StockStatus;
    use basket_core::{CartOwner, CartStatus, InapplicableReason, UserRole};
    use basket_db::{DbConfig, NewDiscount, NewProduct, NewVariant};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        db: Database,
        carts: CartService,
        checkout: CheckoutService,
        notifications: mpsc::Receiver<Notification>,
    }

    async fn fixture_with(config: DbConfig) -> Fixture {
        let db = Database::new(config).await.unwrap();
        let (notifier, notifications) = ChannelNotifier::new(16);
        Fixture {
            carts: CartService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), Arc::new(notifier), "ORD"),
            db,
            notifications,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(DbConfig::in_memory()).await
    }

    async fn product(db: &Database, sku: &str, cents: i64) -> String {
        db.catalog()
            .insert_product(&NewProduct {
                sku: sku.to_string(),
                name: sku.to_lowercase(),
                price: Money::from_cents(cents),
            })
            .await
            .unwrap()
    }

    async fn variant(db: &Database, product_id: &str, sku: &str, stock: i64) -> String {
        db.catalog()
            .insert_variant(
                product_id,
                &NewVariant {
                    sku: sku.to_string(),
                    name: "Default".to_string(),
                    price: None,
                    stock_quantity: stock,
                },
            )
            .await
            .unwrap()
    }

    fn request(cart_id: &str) -> PlaceOrderRequest {
        PlaceOrderRequest {
            cart_id: cart_id.to_string(),
            shipping_address: Some(ShippingAddress {
                full_name: "Ada Buyer".to_string(),
                line1: "7 Quay Road".to_string(),
                line2: Some("Flat 2".to_string()),
                city: "Leeds".to_string(),
                region: None,
                postal_code: "LS1 4AP".to_string(),
                country: "GB".to_string(),
                phone: None,
            }),
            shipping_method: "standard".to_string(),
            payment_method: PaymentMethod::Card,
            customer_email: Some("Ada@Example.com".to_string()),
            customer_phone: None,
        }
    }

    async fn guest_cart(carts: &CartService, key: &str) -> String {
        carts
            .open_cart(&CartOwner::Session(key.to_string()))
            .await
            .unwrap()
            .cart
            .id
    }

    async fn next(rx: &mut mpsc::Receiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_place_order_snapshots_cart() {
        let fx = fixture().await;
        let tee = product(&fx.db, "TEE", 1500).await;
        let tee_m = variant(&fx.db, &tee, "TEE-M", 5).await;

        let cart_id = guest_cart(&fx.carts, "sess-a").await;
        fx.carts.add_item(&cart_id, &tee, Some(&tee_m), 2).await.unwrap();
        fx.carts
            .set_charges(&cart_id, Money::from_cents(240), Money::from_cents(499))
            .await
            .unwrap();

        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();
        assert_eq!(placed.order_number, "ORD-000001");

        let receipt = fx.checkout.get_order(&placed.order_id).await.unwrap();
        let order = &receipt.order;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.subtotal_cents, 3000);
        assert_eq!(order.total_cents, 3000 + 240 + 499);
        assert!(order.totals().is_consistent());
        assert_eq!(order.customer_email.as_deref(), Some("ada@example.com"));
        assert_eq!(order.currency, "USD");

        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].unit_price_cents, 1500);
        assert_eq!(receipt.items[0].quantity, 2);
        assert_eq!(receipt.items[0].sku, "TEE-M");
        assert!(receipt.discount.is_none());
        let address = receipt.shipping_address.unwrap();
        assert_eq!(address.line2.as_deref(), Some("Flat 2"));

        let cart = fx.carts.get_cart(&cart_id).await.unwrap();
        assert_eq!(cart.cart.status, CartStatus::Converted);
        assert!(cart.items.is_empty());

        let stock = fx.db.catalog().get_variant(&tee_m).await.unwrap().unwrap();
        assert_eq!(stock.reserved_quantity, 2);
        let catalog = fx.db.catalog().get_product(&tee).await.unwrap().unwrap();
        assert_eq!(catalog.product.available_quantity, 3);
        assert_eq!(catalog.product.stock_status, StockStatus::LowStock);
    }

    #[tokio::test]
    async fn test_converted_cart_cannot_be_resubmitted() {
        let fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();

        let cart_id = guest_cart(&fx.carts, "sess-b").await;
        fx.carts.add_item(&cart_id, &mug, None, 1).await.unwrap();
        fx.checkout.place_order(request(&cart_id)).await.unwrap();

        let err = fx.checkout.place_order(request(&cart_id)).await.unwrap_err();
        assert!(matches!(err.core(), Some(CoreError::NotFound { .. })));
        assert_eq!(fx.db.orders().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_and_missing_carts() {
        let fx = fixture().await;
        let cart_id = guest_cart(&fx.carts, "sess-c").await;

        let err = fx.checkout.place_order(request(&cart_id)).await.unwrap_err();
        assert!(matches!(err.core(), Some(CoreError::EmptyCart { .. })));

        let missing = Uuid::new_v4().to_string();
        let err = fx.checkout.place_order(request(&missing)).await.unwrap_err();
        assert!(matches!(err.core(), Some(CoreError::NotFound { .. })));

        let err = fx.checkout.get_order(&missing).await.unwrap_err();
        assert!(matches!(err.core(), Some(CoreError::NotFound { entity, .. }) if entity == "Order"));
    }

    #[tokio::test]
    async fn test_invalid_request_touches_nothing() {
        let fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();
        let cart_id = guest_cart(&fx.carts, "sess-d").await;
        fx.carts.add_item(&cart_id, &mug, None, 1).await.unwrap();

        let mut bad_email = request(&cart_id);
        bad_email.customer_email = Some("not-an-email".to_string());
        let err = fx.checkout.place_order(bad_email).await.unwrap_err();
        assert!(matches!(err.core(), Some(CoreError::Validation(_))));

        let mut no_method = request(&cart_id);
        no_method.shipping_method = "  ".to_string();
        let err = fx.checkout.place_order(no_method).await.unwrap_err();
        assert!(matches!(err.core(), Some(CoreError::Validation(_))));

        // no number was burned by the rejected attempts
        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();
        assert_eq!(placed.order_number, "ORD-000001");
    }

    #[tokio::test]
    async fn test_failure_on_middle_line_rolls_back_everything() {
        let fx = fixture().await;
        let catalog = fx.db.catalog();

        let tee = product(&fx.db, "TEE", 1500).await;
        let tee_m = variant(&fx.db, &tee, "TEE-M", 5).await;
        let mug = product(&fx.db, "MUG", 900).await;
        catalog.insert_inventory_row(&mug, "north", 2).await.unwrap();
        catalog.insert_inventory_row(&mug, "south", 1).await.unwrap();
        let cap = product(&fx.db, "CAP", 1200).await;
        let cap_os = variant(&fx.db, &cap, "CAP-OS", 4).await;

        let cart_id = guest_cart(&fx.carts, "sess-e").await;
        fx.carts.add_item(&cart_id, &tee, Some(&tee_m), 2).await.unwrap();
        fx.carts.add_item(&cart_id, &mug, None, 5).await.unwrap();
        fx.carts.add_item(&cart_id, &cap, Some(&cap_os), 1).await.unwrap();

        let err = fx.checkout.place_order(request(&cart_id)).await.unwrap_err();
        assert!(matches!(
            err.core(),
            Some(CoreError::InsufficientStock { product, requested: 5 }) if product == "mug"
        ));

        assert_eq!(catalog.get_variant(&tee_m).await.unwrap().unwrap().reserved_quantity, 0);
        assert_eq!(catalog.get_variant(&cap_os).await.unwrap().unwrap().reserved_quantity, 0);
        for row in catalog.inventory_rows(&mug).await.unwrap() {
            assert_eq!(row.reserved_quantity, 0);
        }
        assert_eq!(fx.db.orders().count().await.unwrap(), 0);

        let cart = fx.carts.get_cart(&cart_id).await.unwrap();
        assert_eq!(cart.cart.status, CartStatus::Active);
        assert_eq!(cart.items.len(), 3);
    }

    #[tokio::test]
    async fn test_discount_snapshot_and_usage_counted() {
        let fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();
        let mut save5 = NewDiscount::fixed_amount(Money::from_cents(500)).with_code("SAVE5");
        save5.usage_limit = Some(10);
        let discount_id = fx.db.discounts().insert(&save5).await.unwrap();

        let cart_id = guest_cart(&fx.carts, "sess-f").await;
        fx.carts.add_item(&cart_id, &mug, None, 2).await.unwrap();
        fx.carts.apply_discount(&cart_id, "save5").await.unwrap();

        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();
        let receipt = fx.checkout.get_order(&placed.order_id).await.unwrap();
        assert_eq!(receipt.order.discount_cents, 500);
        assert_eq!(receipt.order.total_cents, 1300);

        let snapshot = receipt.discount.unwrap();
        assert_eq!(snapshot.discount_id, discount_id);
        assert_eq!(snapshot.code.as_deref(), Some("SAVE5"));
        assert_eq!(snapshot.amount_cents, 500);

        let record = fx.db.discounts().get_record(&discount_id).await.unwrap().unwrap();
        assert_eq!(record.usage_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_discount_dropped_at_checkout() {
        let fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();
        let mut once = NewDiscount::fixed_amount(Money::from_cents(500)).with_code("ONCE");
        once.usage_limit = Some(1);
        let discount_id = fx.db.discounts().insert(&once).await.unwrap();

        let cart_id = guest_cart(&fx.carts, "sess-g").await;
        fx.carts.add_item(&cart_id, &mug, None, 2).await.unwrap();
        fx.carts.apply_discount(&cart_id, "ONCE").await.unwrap();

        // another order uses it up meanwhile
        {
            let mut conn = fx.db.pool().acquire().await.unwrap();
            assert!(fx.db.discounts().increment_usage(&mut conn, &discount_id).await.unwrap());
        }

        let err = fx.carts.apply_discount(&cart_id, "once").await.unwrap_err();
        assert!(matches!(
            err.core(),
            Some(CoreError::InapplicableDiscount { reason: InapplicableReason::UsageLimitReached, .. })
        ));

        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();
        let receipt = fx.checkout.get_order(&placed.order_id).await.unwrap();
        assert_eq!(receipt.order.discount_cents, 0);
        assert_eq!(receipt.order.total_cents, 1800);
        assert!(receipt.discount.is_none());

        let record = fx.db.discounts().get_record(&discount_id).await.unwrap().unwrap();
        assert_eq!(record.usage_count, 1);
    }

    #[tokio::test]
    async fn test_automatic_discount_priced_at_checkout() {
        let fx = fixture().await;
        let tee = product(&fx.db, "TEE", 1000).await;
        let tee_m = variant(&fx.db, &tee, "TEE-M", 10).await;

        let cart_id = guest_cart(&fx.carts, "sess-h").await;
        fx.carts.add_item(&cart_id, &tee, Some(&tee_m), 3).await.unwrap();

        // created after the cart was last priced
        let mut rule = NewDiscount::percentage(1000).automatic();
        rule.min_subtotal = Some(Money::from_cents(2000));
        let discount_id = fx.db.discounts().insert(&rule).await.unwrap();
        let stored = fx.db.carts().get_by_id(&cart_id).await.unwrap().unwrap();
        assert_eq!(stored.discount_cents, 0);

        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();
        let receipt = fx.checkout.get_order(&placed.order_id).await.unwrap();
        assert_eq!(receipt.order.discount_cents, 300);
        assert_eq!(receipt.order.total_cents, 2700);

        let snapshot = receipt.discount.unwrap();
        assert_eq!(snapshot.discount_id, discount_id);
        assert_eq!(snapshot.code, None);
    }

    #[tokio::test]
    async fn test_notifies_admins_and_signed_in_customer() {
        let mut fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();
        let admin = fx.db.users().insert("ops@example.com", UserRole::Admin).await.unwrap();
        let shopper = fx
            .db
            .users()
            .insert("shopper@example.com", UserRole::Customer)
            .await
            .unwrap();

        let cart_id = fx
            .carts
            .open_cart(&CartOwner::User(shopper.id.clone()))
            .await
            .unwrap()
            .cart
            .id;
        fx.carts.add_item(&cart_id, &mug, None, 1).await.unwrap();
        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();

        let first = next(&mut fx.notifications).await;
        assert_eq!(first.kind, NotificationKind::OrderPlaced);
        assert_eq!(first.recipients, vec![admin.id.clone()]);
        assert_eq!(first.metadata["order_number"], placed.order_number.as_str());

        let second = next(&mut fx.notifications).await;
        assert_eq!(second.kind, NotificationKind::OrderConfirmation);
        assert_eq!(second.recipients, vec![shopper.id.clone()]);
        assert_eq!(second.metadata["order_id"], placed.order_id.as_str());
    }

    #[tokio::test]
    async fn test_guest_and_admin_purchases_notify_admins_only() {
        let mut fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();
        let admin = fx.db.users().insert("ops@example.com", UserRole::Admin).await.unwrap();

        let guest = guest_cart(&fx.carts, "sess-i").await;
        fx.carts.add_item(&guest, &mug, None, 1).await.unwrap();
        fx.checkout.place_order(request(&guest)).await.unwrap();

        let own = fx
            .carts
            .open_cart(&CartOwner::User(admin.id.clone()))
            .await
            .unwrap()
            .cart
            .id;
        fx.carts.add_item(&own, &mug, None, 1).await.unwrap();
        fx.checkout.place_order(request(&own)).await.unwrap();

        for _ in 0..2 {
            let notification = next(&mut fx.notifications).await;
            assert_eq!(notification.kind, NotificationKind::OrderPlaced);
        }
        let idle = tokio::time::timeout(Duration::from_millis(200), fx.notifications.recv()).await;
        assert!(idle.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_for_last_unit() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture_with(DbConfig::new(dir.path().join("basket.db")).max_connections(4)).await;
        let lamp = product(&fx.db, "LAMP", 4500).await;
        fx.db.catalog().insert_inventory_row(&lamp, "main", 1).await.unwrap();

        let first = guest_cart(&fx.carts, "sess-j").await;
        let second = guest_cart(&fx.carts, "sess-k").await;
        fx.carts.add_item(&first, &lamp, None, 1).await.unwrap();
        fx.carts.add_item(&second, &lamp, None, 1).await.unwrap();

        let a = tokio::spawn({
            let checkout = fx.checkout.clone();
            async move { checkout.place_order(request(&first)).await }
        });
        let b = tokio::spawn({
            let checkout = fx.checkout.clone();
            async move { checkout.place_order(request(&second)).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| {
                matches!(
                    r.as_ref().err().and_then(EngineError::core),
                    Some(CoreError::InsufficientStock { .. })
                )
            })
            .count();
        assert_eq!((placed, short), (1, 1));

        let rows = fx.db.catalog().inventory_rows(&lamp).await.unwrap();
        assert_eq!(rows[0].reserved_quantity, 1);
        assert_eq!(rows[0].available_quantity, 0);
        assert_eq!(fx.db.orders().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_customer_confirmed_when_admin_lookup_fails() {
        let mut fx = fixture().await;
        let mug = product(&fx.db, "MUG", 900).await;
        fx.db.catalog().insert_inventory_row(&mug, "main", 10).await.unwrap();
        let shopper = Uuid::new_v4().to_string();

        let cart_id = fx
            .carts
            .open_cart(&CartOwner::User(shopper.clone()))
            .await
            .unwrap()
            .cart
            .id;
        fx.carts.add_item(&cart_id, &mug, None, 1).await.unwrap();
        sqlx::query("DROP TABLE users").execute(fx.db.pool()).await.unwrap();

        let placed = fx.checkout.place_order(request(&cart_id)).await.unwrap();

        let notification = next(&mut fx.notifications).await;
        assert_eq!(notification.kind, NotificationKind::OrderConfirmation);
        assert_eq!(notification.recipients, vec![shopper]);
        assert_eq!(notification.metadata["order_id"], placed.order_id.as_str());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_for_last_variant_unit() {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture_with(DbConfig::new(dir.path().join("basket.db")).max_connections(6)).await;
        let tee = product(&fx.db, "TEE", 1500).await;
        let tee_m = variant(&fx.db, &tee, "TEE-M", 1).await;

        let mut cart_ids = Vec::new();
        for n in 0..6 {
            let cart_id = guest_cart(&fx.carts, &format!("sess-v{n}")).await;
            fx.carts.add_item(&cart_id, &tee, Some(&tee_m), 1).await.unwrap();
            cart_ids.push(cart_id);
        }

        let attempts: Vec<_> = cart_ids
            .into_iter()
            .map(|cart_id| {
                let checkout = fx.checkout.clone();
                tokio::spawn(async move { checkout.place_order(request(&cart_id)).await })
            })
            .collect();

        let (mut placed, mut short) = (0, 0);
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => placed += 1,
                Err(err) => {
                    assert!(matches!(err.core(), Some(CoreError::InsufficientStock { .. })));
                    short += 1;
                }
            }
        }
        assert_eq!((placed, short), (1, 5));

        let stock = fx.db.catalog().get_variant(&tee_m).await.unwrap().unwrap();
        assert_eq!(stock.reserved_quantity, 1);
        assert_eq!(stock.available(), 0);
        let catalog = fx.db.catalog().get_product(&tee).await.unwrap().unwrap();
        assert_eq!(catalog.product.stock_status, StockStatus::OutOfStock);
        assert_eq!(fx.db.orders().count().await.unwrap(), 1);
    }
}
