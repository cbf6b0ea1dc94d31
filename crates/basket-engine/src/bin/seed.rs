//! Seeds a demo catalog and walks one cart through checkout.
//!
//! ```text
//! BASKET_DB_PATH=./demo.db cargo run -p basket-engine --bin seed
//! ```

use std::sync::Arc;

use tracing::info;

use basket_core::discount::{BundleRule, DiscountExtensions, DiscountScope};
use basket_core::{CartOwner, Money, PaymentMethod, ShippingAddress, UserRole};
use basket_db::{NewDiscount, NewProduct, NewVariant};
use basket_engine::{init_tracing, Engine, EngineConfig, LogNotifier, PlaceOrderRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = EngineConfig::load()?;
    let engine = Engine::open(config, Arc::new(LogNotifier)).await?;
    let db = engine.database();
    let catalog = db.catalog();

    // Catalog
    let apparel = catalog.insert_category("Apparel", "apparel").await?;
    let kitchen = catalog.insert_category("Kitchen", "kitchen").await?;

    let tee = catalog
        .insert_product(&NewProduct {
            sku: "TEE".to_string(),
            name: "Basic Tee".to_string(),
            price: Money::from_cents(1500),
        })
        .await?;
    catalog.assign_category(&tee, &apparel).await?;
    let tee_medium = catalog
        .insert_variant(
            &tee,
            &NewVariant {
                sku: "TEE-M".to_string(),
                name: "M".to_string(),
                price: None,
                stock_quantity: 25,
            },
        )
        .await?;
    catalog
        .insert_variant(
            &tee,
            &NewVariant {
                sku: "TEE-XL".to_string(),
                name: "XL".to_string(),
                price: Some(Money::from_cents(1700)),
                stock_quantity: 4,
            },
        )
        .await?;

    let mug = catalog
        .insert_product(&NewProduct {
            sku: "MUG".to_string(),
            name: "Enamel Mug".to_string(),
            price: Money::from_cents(900),
        })
        .await?;
    catalog.assign_category(&mug, &kitchen).await?;
    catalog.insert_inventory_row(&mug, "north", 12).await?;
    catalog.insert_inventory_row(&mug, "south", 3).await?;

    // Discounts
    let discounts = db.discounts();
    let mut storewide = NewDiscount::percentage(1000).automatic();
    storewide.min_subtotal = Some(Money::from_cents(2000));
    discounts.insert(&storewide).await?;

    discounts
        .insert(&NewDiscount::fixed_amount(Money::from_cents(500)).with_code("SAVE5"))
        .await?;

    let mut mug_bundle = NewDiscount::percentage(2000).with_code("MUGS3");
    mug_bundle.scope = DiscountScope::Products;
    mug_bundle.product_ids = vec![mug.clone()];
    mug_bundle.extensions = DiscountExtensions {
        bundle: Some(BundleRule { min_quantity: 3 }),
    };
    discounts.insert(&mug_bundle).await?;

    // People
    db.users().insert("admin@example.com", UserRole::Admin).await?;
    let shopper = db.users().insert("shopper@example.com", UserRole::Customer).await?;

    info!(products = 2, discounts = 3, "Catalog seeded");

    // One checkout
    let carts = engine.carts();
    let cart = carts.open_cart(&CartOwner::User(shopper.id.clone())).await?;
    let cart_id = cart.cart.id;
    carts.add_item(&cart_id, &tee, Some(&tee_medium), 2).await?;
    carts.add_item(&cart_id, &mug, None, 3).await?;
    let priced = carts.apply_discount(&cart_id, "mugs3").await?;
    info!(
        cart_id = %cart_id,
        subtotal = %priced.cart.subtotal_cents,
        discount = %priced.cart.discount_cents,
        total = %priced.cart.total_cents,
        "Cart priced"
    );

    let placed = engine
        .checkout()
        .place_order(PlaceOrderRequest {
            cart_id,
            shipping_address: Some(ShippingAddress {
                full_name: "Sam Shopper".to_string(),
                line1: "1 Market Street".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                region: None,
                postal_code: "12345".to_string(),
                country: "US".to_string(),
                phone: None,
            }),
            shipping_method: "standard".to_string(),
            payment_method: PaymentMethod::Card,
            customer_email: Some(shopper.email.clone()),
            customer_phone: None,
        })
        .await?;

    let receipt = engine.checkout().get_order(&placed.order_id).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    // Let the spawned notification task flush before the runtime exits
    tokio::task::yield_now().await;
    db.close().await;
    Ok(())
}
