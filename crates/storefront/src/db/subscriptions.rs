//! Subscription repository.
//!
//! Callers mutate subscriptions inside a transaction that first takes
//! [`SubscriptionRepository::lock_customer`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use aurora_core::{CustomerId, Email, PlanId, SubscriptionId, SubscriptionStatus};

use super::RepositoryError;
use crate::models::Subscription;

/// A subscription joined with its plan's price.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionWithPlan {
    #[sqlx(flatten)]
    pub subscription: Subscription,
    pub price: Decimal,
    pub plan_currency: String,
}

/// Fields of a newly activated subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription<'a> {
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub provider: &'a str,
    pub external_subscription_id: Option<&'a str>,
    pub external_session_id: &'a str,
    pub current_period_end: DateTime<Utc>,
}

/// Repository for subscriptions.
pub struct SubscriptionRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> SubscriptionRepository<'c> {
    /// Create a new subscription repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Serialize subscription transitions for one customer until the
    /// transaction ends.
    ///
    /// Keyed by email so it can be taken before the customer row exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_customer(&mut self, email: &Email) -> Result<(), RepositoryError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("subscription:{email}"))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Find the subscription a checkout session was applied to.
    ///
    /// Looks through every applied session, not only the one last written
    /// to the row, so a session superseded by a renewal is still found.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_session(
        &mut self,
        session_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r"
            SELECT s.subscription_id, s.customer_id, s.plan_id, s.provider,
                   s.external_subscription_id, s.external_session_id, s.status,
                   s.current_period_end, s.created_at, s.updated_at
            FROM applied_checkout_sessions a
            JOIN subscriptions s ON s.subscription_id = a.subscription_id
            WHERE a.session_id = $1
            ",
        )
        .bind(session_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(subscription)
    }

    /// Record that a checkout session was applied to a subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the session was already
    /// recorded.
    pub async fn record_session(
        &mut self,
        session_id: &str,
        subscription_id: SubscriptionId,
    ) -> Result<(), RepositoryError> {
        let inserted = sqlx::query(
            r"
            INSERT INTO applied_checkout_sessions (session_id, subscription_id)
            VALUES ($1, $2)
            ON CONFLICT (session_id) DO NOTHING
            ",
        )
        .bind(session_id)
        .bind(subscription_id)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "checkout session already applied"))?
        .rows_affected();

        if inserted == 0 {
            return Err(RepositoryError::Conflict(
                "checkout session already applied".to_owned(),
            ));
        }
        Ok(())
    }

    /// Email of the customer owning a provider subscription.
    ///
    /// Read without locking so webhook handlers can take
    /// [`Self::lock_customer`] before touching the row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn owner_email(
        &mut self,
        external_subscription_id: &str,
    ) -> Result<Option<Email>, RepositoryError> {
        let email = sqlx::query_scalar::<_, Email>(
            r"
            SELECT c.email
            FROM subscriptions s
            JOIN customers c ON c.customer_id = s.customer_id
            WHERE s.external_subscription_id = $1
            ORDER BY s.created_at DESC
            LIMIT 1
            ",
        )
        .bind(external_subscription_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(email)
    }

    /// Find a subscription by the provider's id and lock it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_by_external_id(
        &mut self,
        external_subscription_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r"
            SELECT subscription_id, customer_id, plan_id, provider, external_subscription_id,
                   external_session_id, status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE external_subscription_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            ",
        )
        .bind(external_subscription_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(subscription)
    }

    /// The customer's live (`active` or `trialing`) subscription, locked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_live(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r"
            SELECT subscription_id, customer_id, plan_id, provider, external_subscription_id,
                   external_session_id, status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE customer_id = $1 AND status IN ('active', 'trialing')
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            ",
        )
        .bind(customer_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(subscription)
    }

    /// The customer's most recent subscription in `status`, locked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_latest_with_status(
        &mut self,
        customer_id: CustomerId,
        status: SubscriptionStatus,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r"
            SELECT subscription_id, customer_id, plan_id, provider, external_subscription_id,
                   external_session_id, status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE customer_id = $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            ",
        )
        .bind(customer_id)
        .bind(status)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(subscription)
    }

    /// The customer's most recent subscription of any status, with its plan price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_with_plan(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<SubscriptionWithPlan>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionWithPlan>(
            r"
            SELECT s.subscription_id, s.customer_id, s.plan_id, s.provider,
                   s.external_subscription_id, s.external_session_id, s.status,
                   s.current_period_end, s.created_at, s.updated_at,
                   p.price, p.currency AS plan_currency
            FROM subscriptions s
            JOIN plans p ON p.plan_id = s.plan_id
            WHERE s.customer_id = $1
            ORDER BY s.created_at DESC
            LIMIT 1
            ",
        )
        .bind(customer_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row)
    }

    /// Renew a live subscription in place.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the session id belongs to
    /// another subscription.
    pub async fn renew(
        &mut self,
        subscription_id: SubscriptionId,
        plan_id: PlanId,
        session_id: &str,
        external_subscription_id: Option<&str>,
        current_period_end: DateTime<Utc>,
    ) -> Result<Subscription, RepositoryError> {
        sqlx::query_as::<_, Subscription>(
            r"
            UPDATE subscriptions
            SET plan_id = $2,
                external_session_id = $3,
                external_subscription_id = COALESCE($4, external_subscription_id),
                current_period_end = $5,
                status = 'active',
                updated_at = NOW()
            WHERE subscription_id = $1
            RETURNING subscription_id, customer_id, plan_id, provider, external_subscription_id,
                      external_session_id, status, current_period_end, created_at, updated_at
            ",
        )
        .bind(subscription_id)
        .bind(plan_id)
        .bind(session_id)
        .bind(external_subscription_id)
        .bind(current_period_end)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "checkout session already applied"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Insert an `active` subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the session id was already
    /// applied or the customer already has a live subscription.
    pub async fn insert(
        &mut self,
        new: &NewSubscription<'_>,
    ) -> Result<Subscription, RepositoryError> {
        sqlx::query_as::<_, Subscription>(
            r"
            INSERT INTO subscriptions
                (subscription_id, customer_id, plan_id, provider, external_subscription_id,
                 external_session_id, status, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7)
            RETURNING subscription_id, customer_id, plan_id, provider, external_subscription_id,
                      external_session_id, status, current_period_end, created_at, updated_at
            ",
        )
        .bind(SubscriptionId::generate())
        .bind(new.customer_id)
        .bind(new.plan_id)
        .bind(new.provider)
        .bind(new.external_subscription_id)
        .bind(new.external_session_id)
        .bind(new.current_period_end)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "live subscription or session already exists"))
    }

    /// Expire the customer's `canceling` subscriptions other than `keep`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn supersede_canceling(
        &mut self,
        customer_id: CustomerId,
        keep: SubscriptionId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE subscriptions
            SET status = 'expired', updated_at = NOW()
            WHERE customer_id = $1 AND status = 'canceling' AND subscription_id <> $2
            ",
        )
        .bind(customer_id)
        .bind(keep)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Move a subscription from `from` to `to`.
    ///
    /// Returns `None` if the row is no longer in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if `to` is live and the customer
    /// already holds another live subscription.
    pub async fn transition(
        &mut self,
        subscription_id: SubscriptionId,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<Option<Subscription>, RepositoryError> {
        sqlx::query_as::<_, Subscription>(
            r"
            UPDATE subscriptions
            SET status = $3, updated_at = NOW()
            WHERE subscription_id = $1 AND status = $2
            RETURNING subscription_id, customer_id, plan_id, provider, external_subscription_id,
                      external_session_id, status, current_period_end, created_at, updated_at
            ",
        )
        .bind(subscription_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "customer already has a live subscription"))
    }

    /// Expire every `active`/`canceling` subscription of the customers with
    /// these emails.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn expire_for_emails(&mut self, emails: &[Email]) -> Result<u64, RepositoryError> {
        let emails: Vec<&str> = emails.iter().map(Email::as_str).collect();
        let result = sqlx::query(
            r"
            UPDATE subscriptions s
            SET status = 'expired', updated_at = NOW()
            FROM customers c
            WHERE s.customer_id = c.customer_id
              AND c.email = ANY($1)
              AND s.status IN ('active', 'canceling')
            ",
        )
        .bind(&emails)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected())
    }
}
