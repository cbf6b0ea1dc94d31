//! # Cart Totals
//!
//! ```text
//! subtotal = Σ line totals
//! total    = subtotal + tax + shipping − discount
//! ```
//!
//! Tax and shipping are inputs carried through from the cart. The discount
//! comes from the selector and is never larger than the subtotal, so the
//! total cannot go below tax + shipping.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::CartItem;

/// Monetary snapshot of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl CartTotals {
    /// Builds totals from their inputs.
    pub fn compute(subtotal: Money, tax: Money, shipping: Money, discount: Money) -> Self {
        let discount = discount.non_negative().min(subtotal.non_negative());
        CartTotals {
            subtotal,
            tax,
            shipping,
            discount,
            total: subtotal + tax + shipping - discount,
        }
    }

    /// Totals for a set of cart lines.
    pub fn for_items(items: &[CartItem], tax: Money, shipping: Money, discount: Money) -> Self {
        Self::compute(subtotal(items), tax, shipping, discount)
    }

    /// The identity every stored cart and order must satisfy.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax + self.shipping - self.discount
    }
}

/// Sum of line totals.
pub fn subtotal(items: &[CartItem]) -> Money {
    items.iter().map(CartItem::line_total).sum()
}
