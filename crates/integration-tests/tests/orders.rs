//! Order materialization against a real database.

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::PgPool;

use aurora_core::{Email, Quantity, VariantId};
use aurora_integration_tests::{count, register, seed_variant};
use aurora_storefront::config::StoreConfig;
use aurora_storefront::models::{AddressInput, CurrentUser, ItemRef};
use aurora_storefront::services::cart::{AddItem, CartService};
use aurora_storefront::services::orders::{
    Checkout, CheckoutCustomer, CheckoutLine, OrderError, OrderService,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn line(variant_id: VariantId, qty: i64) -> CheckoutLine {
    CheckoutLine {
        item: ItemRef::Variant(variant_id),
        quantity: Quantity::new(qty).unwrap(),
        unit_price_hint: None,
    }
}

fn checkout(items: Vec<CheckoutLine>, total: &str) -> Checkout {
    Checkout {
        customer: CheckoutCustomer {
            email: Some(Email::parse("buyer@example.com").unwrap()),
            first_name: "Dana".to_owned(),
            last_name: "Reyes".to_owned(),
            address: AddressInput {
                line1: "12 Harbor Rd".to_owned(),
                line2: None,
                city: "Portland".to_owned(),
                region: "OR".to_owned(),
                postal_code: "97201".to_owned(),
            },
        },
        items,
        total: dec(total),
        notes: None,
        transaction_id: Some("pi_test_1".to_owned()),
        cart_id: None,
    }
}

async fn assert_nothing_written(pool: &PgPool) {
    for table in ["orders", "order_items", "payments", "customers", "addresses"] {
        assert_eq!(count(pool, table).await, 0, "{table} should be empty");
    }
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_order_persists_total_and_lines(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let b = seed_variant(&pool, "MUG", dec("15.00")).await;
    let store = StoreConfig::default();
    let orders = OrderService::new(&pool, &store);

    let order_id = orders
        .create_order(None, checkout(vec![line(a, 1), line(b, 2)], "54.99"))
        .await
        .unwrap();

    let total: Decimal =
        sqlx::query_scalar("SELECT total_amount FROM orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total, dec("54.99"));
    assert_eq!(count(&pool, "order_items").await, 2);
    assert_eq!(count(&pool, "payments").await, 1);

    let external: String =
        sqlx::query_scalar("SELECT external_payment_id FROM payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(external, "pi_test_1");
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_failed_line_write_rolls_back_everything(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let b = seed_variant(&pool, "MUG", dec("15.00")).await;

    sqlx::raw_sql(&format!(
        r"
        CREATE FUNCTION reject_mug() RETURNS trigger AS $$
        BEGIN
            IF NEW.variant_id = '{b}' THEN
                RAISE EXCEPTION 'line rejected';
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;

        CREATE TRIGGER reject_mug BEFORE INSERT ON order_items
            FOR EACH ROW EXECUTE FUNCTION reject_mug();
        "
    ))
    .execute(&pool)
    .await
    .unwrap();

    let store = StoreConfig::default();
    let result = OrderService::new(&pool, &store)
        .create_order(None, checkout(vec![line(a, 1), line(b, 2)], "54.99"))
        .await;

    assert!(matches!(result, Err(OrderError::Persistence(_))));
    assert_nothing_written(&pool).await;
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_unknown_item_aborts_order(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let store = StoreConfig::default();

    let result = OrderService::new(&pool, &store)
        .create_order(
            None,
            checkout(vec![line(a, 1), line(VariantId::generate(), 1)], "40.00"),
        )
        .await;

    assert!(matches!(result, Err(OrderError::UnknownItem { index: 1 })));
    assert_nothing_written(&pool).await;
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_total_below_subtotal_is_rejected(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let store = StoreConfig::default();

    let result = OrderService::new(&pool, &store)
        .create_order(None, checkout(vec![line(a, 3)], "59.99"))
        .await;

    assert!(matches!(result, Err(OrderError::TotalBelowSubtotal { .. })));
    assert_nothing_written(&pool).await;
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_checkout_consumes_source_cart(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let cart_id = CartService::new(&pool)
        .add_item(AddItem {
            cart_id: None,
            item: ItemRef::Variant(a),
            quantity: Quantity::new(1).unwrap(),
            customer_id: None,
            session_token: None,
        })
        .await
        .unwrap();
    let store = StoreConfig::default();

    let mut body = checkout(vec![line(a, 1)], "25.00");
    body.cart_id = Some(cart_id);
    OrderService::new(&pool, &store)
        .create_order(None, body)
        .await
        .unwrap();

    assert_eq!(count(&pool, "carts").await, 0);
    assert_eq!(count(&pool, "cart_items").await, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_order_is_readable_only_by_owner(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let owner = CurrentUser::from(&register(&pool, "owner@example.com").await);
    let other = CurrentUser::from(&register(&pool, "other@example.com").await);
    let store = StoreConfig::default();
    let orders = OrderService::new(&pool, &store);

    let order_id = orders
        .create_order(Some(&owner), checkout(vec![line(a, 2)], "40.00"))
        .await
        .unwrap();

    let detail = orders.get_order(&owner, order_id).await.unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert!(detail.payment.is_some());

    let denied = orders.get_order(&other, order_id).await;
    assert!(matches!(denied, Err(OrderError::NotFound)));
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_repeat_buyer_reuses_customer(pool: PgPool) {
    let a = seed_variant(&pool, "TEE", dec("20.00")).await;
    let store = StoreConfig::default();
    let orders = OrderService::new(&pool, &store);

    for _ in 0..2 {
        let mut body = checkout(vec![line(a, 1)], "20.00");
        body.transaction_id = None;
        orders.create_order(None, body).await.unwrap();
    }

    assert_eq!(count(&pool, "orders").await, 2);
    assert_eq!(count(&pool, "customers").await, 1);
}
