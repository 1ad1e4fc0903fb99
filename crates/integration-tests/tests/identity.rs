//! Customer identity resolution against a real database.

use sqlx::PgPool;
use tokio::task::JoinSet;

use aurora_core::Email;
use aurora_integration_tests::count;
use aurora_storefront::services::identity::IdentityResolver;

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_resolve_is_stable_per_email(pool: PgPool) {
    let resolver = IdentityResolver::new(&pool);
    let email = Email::parse("buyer@example.com").unwrap();

    let first = resolver.resolve(&email, Some("Dana Reyes")).await.unwrap();
    let again = resolver.resolve(&email, None).await.unwrap();

    assert_eq!(first.customer_id, again.customer_id);
    assert_eq!(count(&pool, "customers").await, 1);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires PostgreSQL; set DATABASE_URL"]
async fn test_concurrent_resolves_create_one_customer(pool: PgPool) {
    let mut resolves = JoinSet::new();
    for attempt in 0..8 {
        let pool = pool.clone();
        resolves.spawn(async move {
            let email = Email::parse("  Buyer@Example.com ").unwrap();
            IdentityResolver::new(&pool)
                .resolve(&email, Some(&format!("Buyer {attempt}")))
                .await
                .map(|customer| customer.customer_id)
        });
    }

    let mut ids = Vec::new();
    while let Some(result) = resolves.join_next().await {
        ids.push(result.unwrap().unwrap());
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(count(&pool, "customers").await, 1);
}
