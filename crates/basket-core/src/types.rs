//! # Domain Types
//!
//! Carts, catalog records, users and orders.
//!
//! ## Type Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Product ──1:N──► ProductVariant      (variant-backed stock)           │
//! │      │                                                                  │
//! │      └──1:N──► InventoryRow            (pooled stock, per location)     │
//! │                                                                         │
//! │   Cart ──1:N──► CartItem ──snapshot──► OrderItem ◄──N:1── Order         │
//! │     │                                                    │   │          │
//! │     └── applied discount (code or id)   OrderDiscount ◄──┘   │          │
//! │                                   OrderShippingAddress ◄─────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary columns are stored as integer cents and exposed as [`Money`]
//! through accessor methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::evaluator::PricedLine;
use crate::money::Money;
use crate::stock::StockStatus;
use crate::totals::CartTotals;

// =============================================================================
// Cart Status
// =============================================================================

/// Lifecycle of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Open for mutation.
    #[default]
    Active,
    /// Superseded (for example merged into a user's cart).
    Abandoned,
    /// Turned into an order.
    Converted,
    Expired,
}

// =============================================================================
// Cart Owner
// =============================================================================

/// Who a cart belongs to.
///
/// Resolved by the caller's session layer: an authenticated user id, or an
/// anonymous session key for guests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(String),
    Session(String),
}

/// The discount a customer explicitly put on a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedDiscountRef {
    /// Normalized code; wins over the id when both are stored.
    Code(String),
    Id(String),
}

// =============================================================================
// Cart
// =============================================================================

/// A shopping cart and its last persisted monetary snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Cart {
    pub id: String,
    pub user_id: Option<String>,
    pub session_key: Option<String>,
    pub status: CartStatus,
    pub subtotal_cents: i64,
    /// Pre-computed input, carried through recalculation.
    pub tax_cents: i64,
    /// Pre-computed input, carried through recalculation.
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub discount_id: Option<String>,
    pub discount_code: Option<String>,
    /// Set when this guest cart was folded into a user cart.
    pub merged_into: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Returns the owner, preferring the authenticated user.
    pub fn owner(&self) -> Option<CartOwner> {
        match (&self.user_id, &self.session_key) {
            (Some(user_id), _) => Some(CartOwner::User(user_id.clone())),
            (None, Some(key)) => Some(CartOwner::Session(key.clone())),
            (None, None) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CartStatus::Active
    }

    /// The explicitly applied discount, code first.
    pub fn applied_discount(&self) -> Option<AppliedDiscountRef> {
        match (&self.discount_code, &self.discount_id) {
            (Some(code), _) => Some(AppliedDiscountRef::Code(code.clone())),
            (None, Some(id)) => Some(AppliedDiscountRef::Id(id.clone())),
            (None, None) => None,
        }
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn shipping(&self) -> Money {
        Money::from_cents(self.shipping_cents)
    }

    /// The persisted snapshot as a [`CartTotals`].
    pub fn totals(&self) -> CartTotals {
        CartTotals {
            subtotal: Money::from_cents(self.subtotal_cents),
            tax: self.tax(),
            shipping: self.shipping(),
            discount: Money::from_cents(self.discount_cents),
            total: Money::from_cents(self.total_cents),
        }
    }
}

// =============================================================================
// Cart Item
// =============================================================================

/// A line in a cart, with catalog data denormalized at add time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartItem {
    pub id: String,
    pub cart_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity
    pub total_price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    /// Name shown on receipts and stock errors ("Tee (Large)").
    pub fn display_name(&self) -> String {
        match &self.variant_name {
            Some(variant) => format!("{} ({})", self.product_name, variant),
            None => self.product_name.clone(),
        }
    }

    /// The line as the discount evaluator sees it.
    pub fn priced_line(&self) -> PricedLine {
        PricedLine {
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price(),
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A sellable product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub is_active: bool,
    /// Derived from reservations; never written by catalog code.
    pub stock_status: StockStatus,
    /// Aggregate available units across variants or inventory rows.
    pub available_quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A purchasable variation of a product with its own stock counter.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub sku: String,
    pub name: String,
    /// Overrides the product price when set.
    pub price_cents: Option<i64>,
    pub stock_quantity: i64,
    pub reserved_quantity: i64,
    pub is_active: bool,
}

impl ProductVariant {
    /// Unreserved units.
    #[inline]
    pub fn available(&self) -> i64 {
        self.stock_quantity - self.reserved_quantity
    }
}

/// A product with the data needed to price a line and resolve categories.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct CatalogProduct {
    pub product: Product,
    pub variants: Vec<ProductVariant>,
    pub category_ids: Vec<String>,
}

impl CatalogProduct {
    pub fn variant(&self, variant_id: &str) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Unit price for a line: the variant's own price, else the product's.
    pub fn unit_price(&self, variant: Option<&ProductVariant>) -> Money {
        variant
            .and_then(|v| v.price_cents)
            .map(Money::from_cents)
            .unwrap_or_else(|| self.product.price())
    }
}

/// One location's share of a product's pooled stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryRow {
    pub id: String,
    pub product_id: String,
    pub location: String,
    pub quantity: i64,
    pub reserved_quantity: i64,
    /// Always quantity − reserved_quantity.
    pub available_quantity: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

/// Recorded on the order; no payment is captured here.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    CashOnDelivery,
    Wallet,
}

// =============================================================================
// Order Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

// =============================================================================
// Order
// =============================================================================

/// A placed order. Immutable once written by checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub cart_id: String,
    pub user_id: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipping_method: String,
    pub currency: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Monetary fields as [`CartTotals`], for identity checks.
    pub fn totals(&self) -> CartTotals {
        CartTotals {
            subtotal: Money::from_cents(self.subtotal_cents),
            tax: Money::from_cents(self.tax_cents),
            shipping: Money::from_cents(self.shipping_cents),
            discount: Money::from_cents(self.discount_cents),
            total: Money::from_cents(self.total_cents),
        }
    }
}

/// An order line. Copied from the cart line, never re-priced.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    /// Product name at time of purchase (frozen).
    pub product_name: String,
    pub variant_name: Option<String>,
    /// SKU at time of purchase (frozen).
    pub sku: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub total_price_cents: i64,
}

impl OrderItem {
    /// Snapshots a cart line into an order line.
    pub fn from_cart_item(id: String, order_id: &str, item: &CartItem) -> Self {
        OrderItem {
            id,
            order_id: order_id.to_string(),
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            product_name: item.product_name.clone(),
            variant_name: item.variant_name.clone(),
            sku: item.sku.clone(),
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
            total_price_cents: item.total_price_cents,
        }
    }
}

/// Which discount applied to an order, and for how much.
///
/// Survives later edits or deletion of the discount itself.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderDiscount {
    pub id: String,
    pub order_id: String,
    pub discount_id: String,
    pub code: Option<String>,
    pub discount_type: crate::discount::DiscountType,
    pub amount_cents: i64,
}

// =============================================================================
// Shipping Address
// =============================================================================

/// Address supplied at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// Immutable copy of the checkout address, owned by the order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderShippingAddress {
    pub id: String,
    pub order_id: String,
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

impl OrderShippingAddress {
    pub fn snapshot(id: String, order_id: &str, address: &ShippingAddress) -> Self {
        OrderShippingAddress {
            id,
            order_id: order_id.to_string(),
            full_name: address.full_name.clone(),
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            region: address.region.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            phone: address.phone.clone(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> Cart {
        let now = Utc::now();
        Cart {
            id: "cart-1".to_string(),
            user_id: None,
            session_key: Some("sess-1".to_string()),
            status: CartStatus::Active,
            subtotal_cents: 3000,
            tax_cents: 0,
            shipping_cents: 0,
            discount_cents: 300,
            total_cents: 2700,
            discount_id: Some("disc-1".to_string()),
            discount_code: None,
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_applied_discount_prefers_code() {
        let mut cart = cart();
        assert_eq!(
            cart.applied_discount(),
            Some(AppliedDiscountRef::Id("disc-1".to_string()))
        );

        cart.discount_code = Some("SAVE5".to_string());
        assert_eq!(
            cart.applied_discount(),
            Some(AppliedDiscountRef::Code("SAVE5".to_string()))
        );
    }

    #[test]
    fn test_owner_prefers_user() {
        let mut cart = cart();
        assert_eq!(cart.owner(), Some(CartOwner::Session("sess-1".to_string())));
        cart.user_id = Some("user-1".to_string());
        assert_eq!(cart.owner(), Some(CartOwner::User("user-1".to_string())));
    }

    #[test]
    fn test_variant_price_overrides_product_price() {
        let now = Utc::now();
        let catalog = CatalogProduct {
            product: Product {
                id: "p1".to_string(),
                sku: "TEE".to_string(),
                name: "Tee".to_string(),
                price_cents: 1500,
                is_active: true,
                stock_status: StockStatus::InStock,
                available_quantity: 10,
                created_at: now,
                updated_at: now,
            },
            variants: vec![
                ProductVariant {
                    id: "v1".to_string(),
                    product_id: "p1".to_string(),
                    sku: "TEE-L".to_string(),
                    name: "Large".to_string(),
                    price_cents: Some(1800),
                    stock_quantity: 5,
                    reserved_quantity: 0,
                    is_active: true,
                },
                ProductVariant {
                    id: "v2".to_string(),
                    product_id: "p1".to_string(),
                    sku: "TEE-S".to_string(),
                    name: "Small".to_string(),
                    price_cents: None,
                    stock_quantity: 5,
                    reserved_quantity: 0,
                    is_active: true,
                },
            ],
            category_ids: vec![],
        };

        assert_eq!(catalog.unit_price(catalog.variant("v1")).cents(), 1800);
        assert_eq!(catalog.unit_price(catalog.variant("v2")).cents(), 1500);
        assert_eq!(catalog.unit_price(None).cents(), 1500);
    }
}
