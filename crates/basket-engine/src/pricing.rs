//! # Cart Recalculation
//!
//! Runs after every item and discount mutation, inside the mutation's
//! transaction:
//!
//! ```text
//! cart lines ──► PricedLine[] ─┐
//! applied discount (code/id) ──┼──► select_discount ──► Selection
//! automatic discounts ─────────┤                           │
//! category index ──────────────┘                           ▼
//!                          CartTotals::for_items(lines, tax, shipping, amount)
//!                                                          │
//!                          stale applied discount? clear ◄─┤
//!                                                          ▼
//!                                                    save_totals
//! ```
//!
//! Recalculating twice with no mutation in between writes the same
//! monetary values.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::warn;
use ts_rs::TS;

use basket_core::discount::{Discount, DiscountCode};
use basket_core::evaluator::PricedLine;
use basket_core::selector::{select_discount, SelectedDiscount, Selection};
use basket_core::{AppliedDiscountRef, Cart, CartItem, CartTotals};
use basket_db::{Database, DbError};

use crate::error::EngineResult;

/// A cart as returned by cart operations.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct CartSnapshot {
    pub cart: Cart,
    pub items: Vec<CartItem>,
    /// The discount the current contents earn, if any.
    pub discount: Option<SelectedDiscount>,
    /// Shipping is waived by the selected discount. The shipping amount
    /// itself is left alone.
    pub free_shipping: bool,
}

impl CartSnapshot {
    pub fn totals(&self) -> CartTotals {
        self.cart.totals()
    }
}

/// Selection and totals for a cart's current lines.
#[derive(Debug, Clone)]
pub(crate) struct Pricing {
    pub items: Vec<CartItem>,
    pub selection: Selection,
    pub totals: CartTotals,
    /// Why the cart's applied discount should be dropped.
    pub stale_applied: Option<String>,
}

/// Prices a cart without writing anything.
pub(crate) async fn price_cart(
    db: &Database,
    conn: &mut SqliteConnection,
    cart: &Cart,
    now: DateTime<Utc>,
) -> EngineResult<Pricing> {
    let items = db.carts().items(conn, &cart.id).await?;
    let lines: Vec<PricedLine> = items.iter().map(CartItem::priced_line).collect();

    let (applied, mut stale_applied) = load_applied(db, conn, cart).await?;
    let automatic = db.discounts().automatic_candidates(conn).await?;

    let mut product_ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
    product_ids.sort();
    product_ids.dedup();
    let categories = db.catalog().category_index(conn, &product_ids).await?;

    let selection = select_discount(&lines, applied.as_ref(), &automatic, &categories, now);
    if let Some(reason) = &selection.cleared_applied {
        stale_applied = Some(reason.to_string());
    }

    let totals = CartTotals::for_items(&items, cart.tax(), cart.shipping(), selection.amount());

    Ok(Pricing {
        items,
        selection,
        totals,
        stale_applied,
    })
}

/// Resolves the cart's applied discount.
///
/// A reference that no longer resolves to a usable row comes back as a
/// reason to clear it rather than as an error.
async fn load_applied(
    db: &Database,
    conn: &mut SqliteConnection,
    cart: &Cart,
) -> EngineResult<(Option<Discount>, Option<String>)> {
    let discounts = db.discounts();
    let found = match cart.applied_discount() {
        None => return Ok((None, None)),
        Some(AppliedDiscountRef::Code(raw)) => match DiscountCode::parse(&raw) {
            Ok(code) => discounts.find_by_code(conn, &code).await,
            Err(_) => Ok(None),
        },
        Some(AppliedDiscountRef::Id(id)) => discounts.find_by_id(conn, &id).await,
    };

    match found {
        Ok(Some(discount)) => Ok((Some(discount), None)),
        Ok(None) => Ok((None, Some("discount no longer exists".to_string()))),
        Err(DbError::InvalidRecord { reason, .. }) => Ok((None, Some(reason))),
        Err(err) => Err(err.into()),
    }
}

/// Prices the cart and persists the snapshot.
pub(crate) async fn recalculate(
    db: &Database,
    conn: &mut SqliteConnection,
    cart: &Cart,
) -> EngineResult<CartSnapshot> {
    let carts = db.carts();
    let pricing = price_cart(db, conn, cart, Utc::now()).await?;

    if let Some(reason) = &pricing.stale_applied {
        warn!(cart_id = %cart.id, reason = %reason, "Clearing applied discount");
        carts.set_applied_discount(conn, &cart.id, None, None).await?;
    }
    carts.save_totals(conn, &cart.id, &pricing.totals).await?;

    let cart = carts
        .fetch(conn, &cart.id)
        .await?
        .ok_or_else(|| DbError::not_found("Cart", &cart.id))?;

    Ok(CartSnapshot {
        cart,
        free_shipping: pricing.selection.free_shipping(),
        discount: pricing.selection.selected,
        items: pricing.items,
    })
}
