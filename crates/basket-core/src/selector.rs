//! # Discount Selector
//!
//! Picks the one discount a cart gets. No stacking.
//!
//! ```text
//! applied code/id present?
//!   ├─ yes, eligible ──────────────► use it (whatever it evaluates to)
//!   ├─ yes, not eligible ──────────► mark for clearing, fall through
//!   └─ no
//!        │
//!        ▼
//! automatic discounts, in stored order
//!   eligible + amount strictly greater than best so far ──► new best
//!   ties keep the earlier one
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;

use crate::discount::{Discount, DiscountType};
use crate::error::InapplicableReason;
use crate::evaluator::{evaluate, CategoryLookup, PricedLine};
use crate::money::Money;

/// How the selected discount got onto the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    Applied,
    Automatic,
}

/// The discount chosen for a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct SelectedDiscount {
    pub discount_id: String,
    pub code: Option<String>,
    pub discount_type: DiscountType,
    pub amount: Money,
    pub free_shipping: bool,
    pub source: DiscountSource,
}

/// Outcome of selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub selected: Option<SelectedDiscount>,
    /// Why the applied discount was dropped; the caller clears it from the cart.
    pub cleared_applied: Option<InapplicableReason>,
}

impl Selection {
    pub fn amount(&self) -> Money {
        self.selected
            .as_ref()
            .map(|s| s.amount)
            .unwrap_or_else(Money::zero)
    }

    pub fn free_shipping(&self) -> bool {
        self.selected.as_ref().is_some_and(|s| s.free_shipping)
    }
}

fn selected(discount: &Discount, amount: Money, free_shipping: bool, source: DiscountSource) -> SelectedDiscount {
    SelectedDiscount {
        discount_id: discount.id.clone(),
        code: discount.code.as_ref().map(|c| c.as_str().to_string()),
        discount_type: discount.discount_type(),
        amount,
        free_shipping,
        source,
    }
}

/// Chooses between the applied discount and the automatic ones.
///
/// `applied` is the explicitly applied discount as currently stored, if
/// the cart references one that still exists.
pub fn select_discount(
    lines: &[PricedLine],
    applied: Option<&Discount>,
    automatic: &[Discount],
    categories: &impl CategoryLookup,
    now: DateTime<Utc>,
) -> Selection {
    let mut cleared_applied = None;

    if let Some(discount) = applied {
        match discount.check_eligible(now) {
            Ok(()) => {
                let evaluation = evaluate(lines, discount, categories);
                return Selection {
                    selected: Some(selected(
                        discount,
                        evaluation.amount,
                        evaluation.free_shipping,
                        DiscountSource::Applied,
                    )),
                    cleared_applied: None,
                };
            }
            Err(reason) => cleared_applied = Some(reason),
        }
    }

    let mut best: Option<SelectedDiscount> = None;
    for discount in automatic {
        if !discount.is_automatic || discount.check_eligible(now).is_err() {
            continue;
        }
        let evaluation = evaluate(lines, discount, categories);
        let best_amount = best.as_ref().map(|b| b.amount).unwrap_or_else(Money::zero);
        if evaluation.amount > best_amount {
            best = Some(selected(
                discount,
                evaluation.amount,
                evaluation.free_shipping,
                DiscountSource::Automatic,
            ));
        }
    }

    Selection {
        selected: best,
        cleared_applied,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
