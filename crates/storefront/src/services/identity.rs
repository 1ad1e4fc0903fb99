//! Customer identity resolution.
//!
//! A customer is the durable billing/shipping identity behind an email. Logins
//! (`users`) and guest checkouts both resolve to the same customer row.

use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use aurora_core::Email;

use crate::db::{CustomerRepository, RepositoryError};
use crate::models::Customer;

/// Get-or-create the customer for `email`.
///
/// Safe under concurrent calls for the same email: the upsert is a single
/// statement against the unique email index. `display_name_hint` only fills a
/// blank stored name.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the upsert fails.
#[instrument(skip(conn, display_name_hint), fields(email = %email))]
pub async fn resolve_or_create_customer(
    conn: &mut PgConnection,
    email: &Email,
    display_name_hint: Option<&str>,
) -> Result<Customer, RepositoryError> {
    let name = display_name_hint.map(str::trim).unwrap_or_default();
    let customer = CustomerRepository::new(conn).upsert(email, name).await?;

    tracing::debug!(customer_id = %customer.customer_id, "customer resolved");
    Ok(customer)
}

/// Pool-backed resolver for callers outside a transaction.
pub struct IdentityResolver<'a> {
    pool: &'a PgPool,
}

impl<'a> IdentityResolver<'a> {
    /// Create a resolver over a pool.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Resolve on a pooled connection that is returned when the call ends.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a connection cannot be acquired
    /// or the upsert fails.
    pub async fn resolve(
        &self,
        email: &Email,
        display_name_hint: Option<&str>,
    ) -> Result<Customer, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        resolve_or_create_customer(&mut conn, email, display_name_hint).await
    }
}
