//! # Error Types
//!
//! Domain-specific error types for basket-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  basket-core errors (this file)                                        │
//! │  ├── CoreError            - Business rule failures                     │
//! │  ├── ValidationError      - Input validation failures                  │
//! │  ├── InapplicableReason   - Why a discount cannot apply                │
//! │  └── Ignorable<E>         - Failure of a best-effort side effect       │
//! │                                                                         │
//! │  basket-db errors (separate crate)                                     │
//! │  └── DbError              - Database operation failures                │
//! │                                                                         │
//! │  basket-engine errors                                                  │
//! │  ├── EngineError          - Core | Storage                             │
//! │  └── ApiError             - What callers see (serialized)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced cart, item, product, variant, discount or order is missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The code exists but cannot apply to this cart right now.
    ///
    /// The cart is left untouched when this is returned.
    #[error("Discount {code} cannot be applied: {reason}")]
    InapplicableDiscount {
        code: String,
        reason: InapplicableReason,
    },

    /// A checkout line could not be fully reserved.
    ///
    /// ```text
    /// place_order (2 × Mug)
    ///      │
    ///      ▼
    /// reserve: pooled rows hold 1
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Mug", requested: 2 }
    ///      │
    ///      ▼
    /// whole order rolled back
    /// ```
    #[error("Insufficient stock for {product}: requested {requested}")]
    InsufficientStock { product: String, requested: i64 },

    /// Checkout attempted on a cart with no lines.
    #[error("Cart {cart_id} is empty")]
    EmptyCart { cart_id: String },

    /// Cart has reached the maximum number of lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn inapplicable(code: impl Into<String>, reason: InapplicableReason) -> Self {
        CoreError::InapplicableDiscount {
            code: code.into(),
            reason,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, malformed metadata).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Inapplicable Reason
// =============================================================================

/// Why a discount was rejected for a cart.
///
/// Shared by eligibility checks (status, window, usage) and the evaluator
/// (thresholds, targeting), so the caller always gets the specific cause.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum InapplicableReason {
    #[error("discount is not active")]
    NotActive,

    #[error("discount has not started yet")]
    NotStarted,

    #[error("discount has expired")]
    Expired,

    #[error("usage limit reached")]
    UsageLimitReached,

    /// Collection targeting has no membership data in this engine.
    #[error("collection discounts are not supported")]
    UnsupportedScope,

    #[error("no items in the cart qualify")]
    NoQualifyingItems,

    #[error("requires a qualifying subtotal of {required}")]
    BelowMinimumSubtotal { required: Money },

    #[error("requires at least {required} qualifying items")]
    BundleQuantityNotMet { required: i64 },

    /// Everything matched but the computed amount is zero.
    #[error("discount amount is zero for this cart")]
    ZeroAmount,
}

// =============================================================================
// Ignorable
// =============================================================================

/// A failure that must not undo the work that preceded it.
///
/// Returned by best-effort steps that run after the strict part of a unit
/// of work has already succeeded (usage counters, notifications). Callers
/// log it and carry on.
#[derive(Debug)]
pub struct Ignorable<E> {
    step: &'static str,
    source: E,
}

impl<E> Ignorable<E> {
    pub fn new(step: &'static str, source: E) -> Self {
        Ignorable { step, source }
    }

    /// Name of the best-effort step that failed.
    pub fn step(&self) -> &'static str {
        self.step
    }

    pub fn into_inner(self) -> E {
        self.source
    }
}

impl<E: fmt::Display> fmt::Display for Ignorable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed (ignored): {}", self.step, self.source)
    }
}

impl<E> std::error::Error for Ignorable<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
