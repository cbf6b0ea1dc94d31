//! # Discount Evaluator
//!
//! Computes what one discount is worth against a list of priced lines.
//!
//! ## Algorithm
//! ```text
//! lines ──► qualifying lines (by target) ──► qualifying subtotal / quantity
//!                                                   │
//!              subtotal ≤ 0 ──────────────────────► NoQualifyingItems
//!              subtotal < min_subtotal ───────────► BelowMinimumSubtotal
//!              quantity < bundle.min_quantity ────► BundleQuantityNotMet
//!                                                   │
//!                                                   ▼
//!              Percentage  → rate × subtotal (half up)
//!              FixedAmount → min(value, subtotal)
//!              FreeShipping→ 0, free_shipping = true
//! ```
//!
//! Status, window and usage checks are not part of this step; see
//! [`Discount::check_eligible`](crate::discount::Discount::check_eligible).

use std::collections::{BTreeSet, HashMap};

use crate::discount::{Discount, DiscountBenefit, DiscountTarget};
use crate::error::InapplicableReason;
use crate::money::Money;

/// A cart line as far as discounts are concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl PricedLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Product → category membership used by category-targeted discounts.
pub trait CategoryLookup {
    fn categories_of(&self, product_id: &str) -> Option<&BTreeSet<String>>;
}

impl CategoryLookup for HashMap<String, BTreeSet<String>> {
    fn categories_of(&self, product_id: &str) -> Option<&BTreeSet<String>> {
        self.get(product_id)
    }
}

/// Result of evaluating a single discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Never negative, never above the qualifying subtotal.
    pub amount: Money,
    pub free_shipping: bool,
    pub qualifying_subtotal: Money,
    pub qualifying_quantity: i64,
    /// Set when the discount does nothing for this cart.
    pub rejection: Option<InapplicableReason>,
}

impl Evaluation {
    fn rejected(subtotal: Money, quantity: i64, reason: InapplicableReason) -> Self {
        Evaluation {
            amount: Money::zero(),
            free_shipping: false,
            qualifying_subtotal: subtotal,
            qualifying_quantity: quantity,
            rejection: Some(reason),
        }
    }

    /// Positive amount, or free shipping with qualifying lines.
    pub fn is_applicable(&self) -> bool {
        self.rejection.is_none()
    }
}

fn qualifies(target: &DiscountTarget, line: &PricedLine, categories: &impl CategoryLookup) -> bool {
    match target {
        DiscountTarget::AllLines | DiscountTarget::CustomerGroups => true,
        DiscountTarget::Products(ids) => ids.contains(&line.product_id),
        DiscountTarget::Categories(wanted) => categories
            .categories_of(&line.product_id)
            .is_some_and(|have| !have.is_disjoint(wanted)),
        DiscountTarget::Unsupported(_) => false,
    }
}

/// Evaluates `discount` against `lines`.
///
/// ```rust
/// use std::collections::HashMap;
/// use basket_core::discount::{Discount, DiscountBenefit, DiscountTarget, DiscountStatus,
///     UsageCounter, ActiveWindow, DiscountExtensions};
/// use basket_core::evaluator::{evaluate, PricedLine};
/// use basket_core::money::{Money, Percentage};
///
/// let discount = Discount {
///     id: "auto-10".into(),
///     code: None,
///     benefit: DiscountBenefit::Percentage(Percentage::from_hundredths(1000)),
///     target: DiscountTarget::AllLines,
///     min_subtotal: Some(Money::from_cents(2000)),
///     usage: UsageCounter { limit: None, count: 0 },
///     window: ActiveWindow::default(),
///     is_automatic: true,
///     status: DiscountStatus::Active,
///     extensions: DiscountExtensions::default(),
/// };
/// let lines = [PricedLine { product_id: "p1".into(), quantity: 3, unit_price: Money::from_cents(1000) }];
///
/// let evaluation = evaluate(&lines, &discount, &HashMap::new());
/// assert_eq!(evaluation.amount.cents(), 300);
/// ```
pub fn evaluate(
    lines: &[PricedLine],
    discount: &Discount,
    categories: &impl CategoryLookup,
) -> Evaluation {
    if let DiscountTarget::Unsupported(_) = discount.target {
        return Evaluation::rejected(Money::zero(), 0, InapplicableReason::UnsupportedScope);
    }

    let (subtotal, quantity) = lines
        .iter()
        .filter(|line| qualifies(&discount.target, line, categories))
        .fold((Money::zero(), 0i64), |(subtotal, quantity), line| {
            (subtotal + line.line_total(), quantity + line.quantity)
        });

    if !subtotal.is_positive() {
        return Evaluation::rejected(subtotal, quantity, InapplicableReason::NoQualifyingItems);
    }

    if let Some(required) = discount.min_subtotal {
        if subtotal < required {
            return Evaluation::rejected(
                subtotal,
                quantity,
                InapplicableReason::BelowMinimumSubtotal { required },
            );
        }
    }

    if let Some(bundle) = discount.extensions.bundle {
        if quantity < bundle.min_quantity {
            return Evaluation::rejected(
                subtotal,
                quantity,
                InapplicableReason::BundleQuantityNotMet {
                    required: bundle.min_quantity,
                },
            );
        }
    }

    let (amount, free_shipping) = match discount.benefit {
        DiscountBenefit::Percentage(rate) => (rate.of(subtotal), false),
        DiscountBenefit::FixedAmount(value) => (value.min(subtotal), false),
        DiscountBenefit::FreeShipping => (Money::zero(), true),
    };
    let amount = amount.non_negative().min(subtotal);

    let rejection = if amount.is_zero() && !free_shipping {
        Some(InapplicableReason::ZeroAmount)
    } else {
        None
    };

    Evaluation {
        amount,
        free_shipping,
        qualifying_subtotal: subtotal,
        qualifying_quantity: quantity,
        rejection,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
