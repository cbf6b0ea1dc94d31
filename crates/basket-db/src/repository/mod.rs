//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CartService / CheckoutService                                          │
//! │       │                                                                 │
//! │       │  db.carts().claim(&mut *tx, cart_id)                            │
//! │       ▼                                                                 │
//! │  CartRepository                                                         │
//! │  ├── reads on the pool           get_by_id, get_items, find_item       │
//! │  └── writes on a caller's tx     claim, insert_item, save_totals ...   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods taking `conn: &mut SqliteConnection` run on whatever the caller
//! passes (usually `&mut *tx`), so several repositories can share one unit
//! of work. Stock counters are not written here; see [`crate::inventory`].
//!
//! ## Available Repositories
//!
//! - [`CartRepository`] - Carts and cart lines
//! - [`CatalogRepository`] - Products, variants, categories, stock reads
//! - [`DiscountRepository`] - Discount rows, targets, usage counters
//! - [`OrderRepository`] - Orders and their snapshots
//! - [`SettingsRepository`] - Key/value business settings
//! - [`SequenceRepository`] - Human-facing document numbers
//! - [`UserRepository`] - Notification recipients

pub mod cart;
pub mod catalog;
pub mod discount;
pub mod order;
pub mod sequence;
pub mod settings;
pub mod user;

pub use cart::CartRepository;
pub use catalog::CatalogRepository;
pub use discount::DiscountRepository;
pub use order::OrderRepository;
pub use sequence::SequenceRepository;
pub use settings::SettingsRepository;
pub use user::UserRepository;
