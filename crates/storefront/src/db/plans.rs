//! Plan repository.

use rust_decimal::Decimal;
use sqlx::PgConnection;

use aurora_core::{CurrencyCode, PlanId, PlanInterval};

use super::RepositoryError;

/// Repository for billing plans.
pub struct PlanRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PlanRepository<'c> {
    /// Create a new plan repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Get-or-create a plan by code. An existing plan keeps its price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(
        &mut self,
        code: &str,
        price: Decimal,
        currency: &CurrencyCode,
        interval: PlanInterval,
    ) -> Result<PlanId, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let plan_id = sqlx::query_scalar::<_, PlanId>(
            r"
            INSERT INTO plans (plan_id, code, price, currency, interval)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE SET code = EXCLUDED.code
            RETURNING plan_id
            ",
        )
        .bind(PlanId::generate())
        .bind(code)
        .bind(price)
        .bind(currency.as_str())
        .bind(interval)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(plan_id)
    }
}
