//! # basket-core: Pure Pricing Logic
//!
//! Money math, discount rules and input validation for the basket engine.
//! Nothing in here touches a database, a clock or a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Basket Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 basket-engine (operations)                      │   │
//! │  │   add_item, apply_discount, place_order, merge_guest_cart ...   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ basket-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │ discount │ │evaluator │ │ selector │ │  totals  │          │   │
//! │  │   │  rules   │ │ amount   │ │ best-of  │ │ identity │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  basket-db (Database Layer)                     │   │
//! │  │        SQLite queries, migrations, inventory reservation        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer cents and hundredths-of-a-percent rates
//! - [`types`] - Carts, orders, catalog records
//! - [`discount`] - Discount definitions and eligibility
//! - [`evaluator`] - Discount amount for one discount against a cart
//! - [`selector`] - Which single discount a cart gets
//! - [`totals`] - Cart totals identity
//! - [`stock`] - Stock status thresholds
//! - [`validation`] - Input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use basket_core::money::{Money, Percentage};
//!
//! let subtotal = Money::from_cents(3000);
//! let ten_percent = Percentage::from_hundredths(1000);
//!
//! assert_eq!(ten_percent.of(subtotal).cents(), 300);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod discount;
pub mod error;
pub mod evaluator;
pub mod money;
pub mod selector;
pub mod stock;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, Ignorable, InapplicableReason, ValidationError};
pub use money::{Money, Percentage};
pub use totals::CartTotals;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single cart line.
///
/// Stops a typo like 1000 instead of 10 from reserving a warehouse.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Longest accepted discount code, after normalization.
pub const MAX_DISCOUNT_CODE_LEN: usize = 64;
