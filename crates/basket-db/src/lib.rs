//! # basket-db: Storage Layer for Basket
//!
//! SQLite access through sqlx. Owns every SQL statement in the workspace,
//! including the only code that moves stock between "available" and
//! "reserved".
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Basket Data Flow                                │
//! │                                                                         │
//! │  CartService / CheckoutService (basket-engine)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   basket-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌──────────────┐    │   │
//! │  │   │   Database    │   │  Repositories  │   │  inventory   │    │   │
//! │  │   │   (pool.rs)   │   │ carts catalog  │   │  reserve_    │    │   │
//! │  │   │               │◄──│ discounts      │   │  lines()     │    │   │
//! │  │   │ SqlitePool    │   │ orders users   │   │  guarded     │    │   │
//! │  │   │ begin()       │   │ settings seqs  │   │  UPDATEs     │    │   │
//! │  │   └───────────────┘   └────────────────┘   └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          SQLite (WAL) + migrations/sqlite/001_initial_schema     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions
//!
//! Repository methods that take `&mut SqliteConnection` run inside whatever
//! the caller hands them: a pooled connection or `&mut *tx`. Methods that
//! take only `&self` use the pool directly and must not be called while the
//! caller holds a connection from a single-connection pool.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use basket_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("basket.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let cart = db.carts().claim(&mut tx, &cart_id).await?;
//! // ...
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod inventory;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use inventory::{reserve_lines, ReservationError, ReservationLine};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

pub use repository::catalog::{NewProduct, NewVariant};
pub use repository::discount::NewDiscount;
pub use repository::{
    CartRepository, CatalogRepository, DiscountRepository, OrderRepository, SequenceRepository,
    SettingsRepository, UserRepository,
};
