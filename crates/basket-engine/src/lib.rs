//! # basket-engine: Cart and Checkout Operations
//!
//! The surface an API layer calls. Pricing rules live in `basket-core`,
//! SQL in `basket-db`; this crate sequences them into units of work.
//!
//! ## Module Organization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          basket-engine                                  │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐    │
//! │  │   cart      │  │  checkout   │  │  pricing    │  │   notify    │    │
//! │  │             │  │             │  │             │  │             │    │
//! │  │ add/update/ │  │ place_order │  │ price_cart  │  │ Notifier    │    │
//! │  │ remove/     │  │ get_order   │  │ recalculate │  │ LogNotifier │    │
//! │  │ discounts   │  │             │  │             │  │ Channel...  │    │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘    │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐                                      │
//! │  │   config    │  │   error     │                                      │
//! │  │ EngineConfig│  │ EngineError │                                      │
//! │  │ (env vars)  │  │ ApiError    │                                      │
//! │  └─────────────┘  └─────────────┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use basket_engine::{Engine, EngineConfig, LogNotifier};
//!
//! let engine = Engine::open(EngineConfig::load()?, Arc::new(LogNotifier)).await?;
//! let cart = engine.carts().open_cart(&owner).await?;
//! engine.carts().add_item(&cart.cart.id, "prod-1", None, 2).await?;
//! let placed = engine.checkout().place_order(request).await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use basket_db::Database;

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod notify;
pub mod pricing;

pub use cart::CartService;
pub use checkout::{CheckoutService, OrderPlaced, OrderReceipt, PlaceOrderRequest};
pub use config::{ConfigError, EngineConfig};
pub use error::{ApiError, EngineError, EngineResult, ErrorCode};
pub use notify::{ChannelNotifier, LogNotifier, Notification, NotificationKind, Notifier, NotifyError};
pub use pricing::CartSnapshot;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,basket=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Handle bundling the database, configuration and notifier.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    config: EngineConfig,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    /// Opens the database (running migrations) and builds the engine.
    pub async fn open(config: EngineConfig, notifier: Arc<dyn Notifier>) -> EngineResult<Self> {
        info!(path = %config.db_path.display(), "Opening basket database");
        let db = Database::new(config.db_config()).await?;
        Ok(Self::with_database(db, config, notifier))
    }

    /// Opens the engine with a [`ChannelNotifier`] sized by
    /// `notification_buffer`. The caller drains the returned receiver.
    pub async fn open_with_queue(
        config: EngineConfig,
    ) -> EngineResult<(Self, mpsc::Receiver<Notification>)> {
        let (notifier, queue) = ChannelNotifier::new(config.notification_buffer);
        let engine = Self::open(config, Arc::new(notifier)).await?;
        Ok((engine, queue))
    }

    /// Wraps an already open database.
    pub fn with_database(db: Database, config: EngineConfig, notifier: Arc<dyn Notifier>) -> Self {
        Engine {
            db,
            config,
            notifier,
        }
    }

    pub fn carts(&self) -> CartService {
        CartService::new(self.db.clone())
    }

    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(
            self.db.clone(),
            Arc::clone(&self.notifier),
            self.config.order_prefix.clone(),
        )
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::{CartOwner, Money, PaymentMethod, UserRole};
    use basket_db::NewProduct;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_with_queue_delivers_order_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            db_path: dir.path().join("basket.db"),
            notification_buffer: 4,
            ..EngineConfig::default()
        };
        let (engine, mut queue) = Engine::open_with_queue(config).await.unwrap();

        let db = engine.database();
        let admin = db.users().insert("ops@example.com", UserRole::Admin).await.unwrap();
        let mug = db
            .catalog()
            .insert_product(&NewProduct {
                sku: "MUG".to_string(),
                name: "Mug".to_string(),
                price: Money::from_cents(900),
            })
            .await
            .unwrap();
        db.catalog().insert_inventory_row(&mug, "main", 5).await.unwrap();

        let carts = engine.carts();
        let cart_id = carts
            .open_cart(&CartOwner::Session("sess-1".to_string()))
            .await
            .unwrap()
            .cart
            .id;
        carts.add_item(&cart_id, &mug, None, 1).await.unwrap();
        let placed = engine
            .checkout()
            .place_order(PlaceOrderRequest {
                cart_id,
                shipping_address: None,
                shipping_method: "pickup".to_string(),
                payment_method: PaymentMethod::CashOnDelivery,
                customer_email: None,
                customer_phone: None,
            })
            .await
            .unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(2), queue.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.kind, NotificationKind::OrderPlaced);
        assert_eq!(notification.recipients, vec![admin.id]);
        assert_eq!(notification.metadata["order_number"], placed.order_number.as_str());
    }
}
