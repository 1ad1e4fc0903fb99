//! Aurora Pro subscription reconciler.
//!
//! Keeps the user's entitlement (`users.is_pro / pro_plan / pro_valid`) and
//! the local subscription row consistent with the billing provider.
//!
//! # Locking
//!
//! Every transition takes a per-customer advisory lock (keyed by email)
//! before it locks any row, so activations, cancellations and webhook
//! updates for one customer are serialized and always lock in the same order.
//!
//! Cancel and reactivate keep their transaction, and so a pooled connection,
//! the advisory lock and the row lock, open across the provider call, for at
//! most the billing timeout. Concurrent slow provider calls can therefore
//! hold that many connections; `STOREFRONT_DB_MAX_CONNECTIONS` is sized with
//! this in mind. Activation and `read` make no provider call while holding a
//! connection.
//!
//! # Provider ordering
//!
//! Cancel and reactivate call the provider before the local write and try a
//! compensating provider call if the local commit fails. Activation writes
//! locally only; the payment confirmation is its source of truth.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::instrument;

use aurora_core::{
    CustomerId, Email, ProPlan, SubscriptionId, SubscriptionStatus,
};

use crate::billing::{
    BillingError, BillingProvider, CheckoutSession, PROVIDER_NAME, ProviderSubscription,
};
use crate::config::StoreConfig;
use crate::db::subscriptions::NewSubscription;
use crate::db::{CustomerRepository, RepositoryError, SubscriptionRepository, UserRepository};
use crate::models::{Subscription, SubscriptionView};
use crate::services::identity::resolve_or_create_customer;
use crate::services::plans::PlanCache;

/// Errors from subscription transitions.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No user is registered under the email.
    #[error("user not found")]
    UserNotFound,

    /// No subscription in the state the transition starts from.
    #[error("{0}")]
    SubscriptionNotFound(&'static str),

    /// The provider does not confirm the checkout session as a paid
    /// subscription purchase for this customer.
    #[error("checkout not confirmed: {0}")]
    CheckoutNotConfirmed(&'static str),

    /// The billing provider failed or timed out; nothing was written locally.
    #[error("billing provider error: {0}")]
    Provider(#[from] BillingError),

    /// A uniqueness rule rejected the transition.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ReconcileError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for ReconcileError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// A confirmed checkout to apply.
#[derive(Debug, Clone)]
pub struct Activation {
    pub email: Email,
    pub plan: ProPlan,
    pub session_id: String,
    pub external_subscription_id: Option<String>,
}

/// Result of an activation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub pro_valid: DateTime<Utc>,
    pub customer_id: CustomerId,
    pub subscription_id: SubscriptionId,
    /// The session had already been applied; nothing changed.
    pub replayed: bool,
}

/// Result of an expiry sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub count: usize,
    pub emails: Vec<Email>,
}

/// Subscription transitions over the store and the billing provider.
pub struct SubscriptionReconciler<'a> {
    pool: &'a PgPool,
    billing: &'a dyn BillingProvider,
    plans: &'a PlanCache,
    store: &'a StoreConfig,
    provider_timeout: Duration,
}

impl<'a> SubscriptionReconciler<'a> {
    /// Create a reconciler.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        billing: &'a dyn BillingProvider,
        plans: &'a PlanCache,
        store: &'a StoreConfig,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            billing,
            plans,
            store,
            provider_timeout,
        }
    }

    /// Bound a provider call by the configured timeout.
    async fn provider<T>(
        &self,
        call: impl Future<Output = Result<T, BillingError>>,
    ) -> Result<T, BillingError> {
        tokio::time::timeout(self.provider_timeout, call)
            .await
            .map_err(|_| BillingError::Timeout)?
    }

    /// Grant or renew Aurora Pro for a confirmed checkout.
    ///
    /// Idempotent on `session_id`: a replay of any session ever applied,
    /// including one a later renewal superseded, returns the stored
    /// subscription without writing. A live subscription is renewed in
    /// place; otherwise a new one is inserted and older canceling rows are
    /// superseded.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::UserNotFound` if no user has the email.
    #[instrument(skip(self, activation), fields(email = %activation.email, plan = %activation.plan))]
    pub async fn activate(
        &self,
        activation: Activation,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome, ReconcileError> {
        // Committed on its own so the cached id never points at a rolled-back row
        let plan_id = self
            .plans
            .plan_id(self.pool, activation.plan, self.store)
            .await?;

        let mut tx = self.pool.begin().await?;
        SubscriptionRepository::new(&mut tx)
            .lock_customer(&activation.email)
            .await?;

        let user = UserRepository::new(&mut tx)
            .lock_by_email(&activation.email)
            .await?
            .ok_or(ReconcileError::UserNotFound)?;

        if let Some(existing) = SubscriptionRepository::new(&mut tx)
            .find_by_session(&activation.session_id)
            .await?
        {
            tracing::info!(
                subscription_id = %existing.subscription_id,
                "checkout session already applied"
            );
            return Ok(ActivationOutcome {
                pro_valid: existing.current_period_end,
                customer_id: existing.customer_id,
                subscription_id: existing.subscription_id,
                replayed: true,
            });
        }

        let pro_valid = activation.plan.entitlement_end(now);
        UserRepository::new(&mut tx)
            .grant_pro(user.id, activation.plan, pro_valid)
            .await?;

        let customer =
            resolve_or_create_customer(&mut tx, &activation.email, Some(&user.username)).await?;

        let mut subscriptions = SubscriptionRepository::new(&mut tx);
        let subscription = match subscriptions.lock_live(customer.customer_id).await? {
            Some(live) => {
                subscriptions
                    .renew(
                        live.subscription_id,
                        plan_id,
                        &activation.session_id,
                        activation.external_subscription_id.as_deref(),
                        pro_valid,
                    )
                    .await?
            }
            None => {
                let created = subscriptions
                    .insert(&NewSubscription {
                        customer_id: customer.customer_id,
                        plan_id,
                        provider: PROVIDER_NAME,
                        external_subscription_id: activation.external_subscription_id.as_deref(),
                        external_session_id: &activation.session_id,
                        current_period_end: pro_valid,
                    })
                    .await?;
                let superseded = subscriptions
                    .supersede_canceling(customer.customer_id, created.subscription_id)
                    .await?;
                if superseded > 0 {
                    tracing::info!(superseded, "older canceling subscriptions expired");
                }
                created
            }
        };

        SubscriptionRepository::new(&mut tx)
            .record_session(&activation.session_id, subscription.subscription_id)
            .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.subscription_id,
            %pro_valid,
            "subscription activated"
        );
        Ok(ActivationOutcome {
            pro_valid,
            customer_id: customer.customer_id,
            subscription_id: subscription.subscription_id,
            replayed: false,
        })
    }

    /// Activate from a client-reported checkout after confirming it with the
    /// provider.
    ///
    /// The session must be a completed subscription checkout; when it names
    /// a customer email, that email must match. The provider's subscription
    /// id fills in a missing `external_subscription_id`.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::CheckoutNotConfirmed` if the provider does not
    /// vouch for the session and `ReconcileError::Provider` if it cannot be
    /// reached.
    #[instrument(skip(self, activation), fields(email = %activation.email, session_id = %activation.session_id))]
    pub async fn activate_confirmed(
        &self,
        mut activation: Activation,
        now: DateTime<Utc>,
    ) -> Result<ActivationOutcome, ReconcileError> {
        let session = self
            .provider(self.billing.checkout_session(&activation.session_id))
            .await?;
        confirm_checkout(&session, &activation.email)?;

        if activation.external_subscription_id.is_none() {
            activation.external_subscription_id = session.subscription;
        }
        self.activate(activation, now).await
    }

    /// Suppress renewal; entitlement runs until its recorded end.
    ///
    /// `subscription_ref`, when given, must match the active subscription's
    /// local id or provider id.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::SubscriptionNotFound` if there is no matching
    /// active subscription and `ReconcileError::Provider` if the provider
    /// call fails, in which case nothing is written.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn cancel(
        &self,
        email: &Email,
        subscription_ref: Option<&str>,
    ) -> Result<Subscription, ReconcileError> {
        const NOT_FOUND: &str = "no active subscription";

        let mut tx = self.pool.begin().await?;
        let Some(subscription) =
            lock_latest(&mut tx, email, SubscriptionStatus::Active).await?
        else {
            return Err(ReconcileError::SubscriptionNotFound(NOT_FOUND));
        };
        if let Some(wanted) = subscription_ref
            && !matches_ref(&subscription, wanted)
        {
            return Err(ReconcileError::SubscriptionNotFound(NOT_FOUND));
        }

        self.switch_renewal(
            tx,
            subscription,
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceling,
            true,
        )
        .await
    }

    /// Undo a pending cancellation while the period is still running.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::SubscriptionNotFound` if there is no
    /// canceling subscription in its period and `ReconcileError::Provider` if
    /// the provider call fails, in which case nothing is written.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn reactivate(
        &self,
        email: &Email,
        now: DateTime<Utc>,
    ) -> Result<Subscription, ReconcileError> {
        const NOT_FOUND: &str = "no canceling subscription";

        let mut tx = self.pool.begin().await?;
        let Some(subscription) =
            lock_latest(&mut tx, email, SubscriptionStatus::Canceling).await?
        else {
            return Err(ReconcileError::SubscriptionNotFound(NOT_FOUND));
        };
        if subscription.current_period_end <= now {
            return Err(ReconcileError::SubscriptionNotFound(NOT_FOUND));
        }

        self.switch_renewal(
            tx,
            subscription,
            SubscriptionStatus::Canceling,
            SubscriptionStatus::Active,
            false,
        )
        .await
    }

    /// Provider first, then the local transition; compensate on local failure.
    async fn switch_renewal(
        &self,
        tx: Transaction<'_, Postgres>,
        subscription: Subscription,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        cancel_at_period_end: bool,
    ) -> Result<Subscription, ReconcileError> {
        let external_id = subscription.external_subscription_id.clone();

        match external_id.as_deref() {
            Some(id) => {
                let remote = self
                    .provider(self.billing.set_cancel_at_period_end(id, cancel_at_period_end))
                    .await?;
                tracing::debug!(
                    external_subscription_id = id,
                    remote_status = %remote.status,
                    "provider renewal flag updated"
                );
            }
            None => tracing::warn!(
                subscription_id = %subscription.subscription_id,
                "subscription has no provider id; updating local state only"
            ),
        }

        match commit_transition(tx, subscription.subscription_id, from, to).await {
            Ok(updated) => {
                tracing::info!(
                    subscription_id = %updated.subscription_id,
                    status = %updated.status,
                    "subscription renewal switched"
                );
                Ok(updated)
            }
            Err(e) => {
                if let Some(id) = external_id.as_deref() {
                    self.compensate(id, !cancel_at_period_end).await;
                }
                Err(e.into())
            }
        }
    }

    async fn compensate(&self, external_id: &str, cancel_at_period_end: bool) {
        match self
            .provider(self.billing.set_cancel_at_period_end(external_id, cancel_at_period_end))
            .await
        {
            Ok(_) => tracing::warn!(
                external_subscription_id = external_id,
                "local write failed; provider change reverted"
            ),
            Err(e) => tracing::error!(
                external_subscription_id = external_id,
                error = %e,
                "local write failed and provider change could not be reverted"
            ),
        }
    }

    /// Derive the display view for a user.
    ///
    /// The renewal flag comes from the provider when reachable and falls back
    /// to the local status.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::UserNotFound` if no user has the email.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn read(
        &self,
        email: &Email,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionView, ReconcileError> {
        // The connection goes back to the pool before any provider call
        let (user, latest) = {
            let mut conn = self.pool.acquire().await?;
            let user = UserRepository::new(&mut conn)
                .get_by_email(email)
                .await?
                .ok_or(ReconcileError::UserNotFound)?;
            let latest = match CustomerRepository::new(&mut conn).get_by_email(email).await? {
                Some(customer) => {
                    SubscriptionRepository::new(&mut conn)
                        .latest_with_plan(customer.customer_id)
                        .await?
                }
                None => None,
            };
            (user, latest)
        };

        let entitled = user.is_entitled(now);
        let cancel_at_period_end = match &latest {
            None => false,
            Some(row) => {
                let local = row.subscription.status == SubscriptionStatus::Canceling;
                match row.subscription.external_subscription_id.as_deref() {
                    Some(id) if entitled => match self.provider(self.billing.retrieve(id)).await {
                        Ok(remote) => remote.cancel_at_period_end,
                        Err(e) => {
                            tracing::warn!(error = %e, "provider unavailable; using local renewal state");
                            local
                        }
                    },
                    _ => local,
                }
            }
        };

        let mut view =
            SubscriptionView::derive(entitled, user.pro_plan, user.pro_valid, cancel_at_period_end);
        if let Some(row) = latest {
            view.amount = Some(row.price);
            view.currency = Some(row.plan_currency);
            view.subscription_id = Some(row.subscription.subscription_id);
        }
        Ok(view)
    }

    /// Expire every lapsed entitlement, `batch_size` users per transaction.
    ///
    /// Idempotent: a second run with nothing newly lapsed changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Repository` if a batch fails. Earlier
    /// batches stay committed and the sweep can be rerun.
    #[instrument(skip(self))]
    pub async fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<SweepReport, ReconcileError> {
        let batch_size = batch_size.max(1);
        let mut report = SweepReport::default();

        loop {
            let mut tx = self.pool.begin().await?;
            let emails = UserRepository::new(&mut tx)
                .expire_batch(now, batch_size)
                .await?;
            if emails.is_empty() {
                break;
            }
            let expired = SubscriptionRepository::new(&mut tx)
                .expire_for_emails(&emails)
                .await?;
            tx.commit().await?;

            let last_batch = i64::try_from(emails.len()).unwrap_or(i64::MAX) < batch_size;
            tracing::info!(users = emails.len(), subscriptions = expired, "expired batch");
            report.count += emails.len();
            report.emails.extend(emails);
            if last_batch {
                break;
            }
        }

        Ok(report)
    }

    /// Apply a completed checkout reported by webhook.
    ///
    /// Returns `None` for sessions that are not paid subscription purchases
    /// or lack the email or plan needed to activate.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::UserNotFound` if no user has the email.
    pub async fn apply_checkout(
        &self,
        session: CheckoutSession,
        now: DateTime<Utc>,
    ) -> Result<Option<ActivationOutcome>, ReconcileError> {
        let Some(activation) = checkout_activation(session) else {
            return Ok(None);
        };
        self.activate(activation, now).await.map(Some)
    }

    /// Mirror the provider's renewal flag onto the local status.
    ///
    /// Returns the updated row, or `None` when nothing needed to change.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Repository` if the store fails.
    #[instrument(skip(self, remote), fields(external_subscription_id = %remote.id))]
    pub async fn apply_provider_update(
        &self,
        remote: &ProviderSubscription,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, ReconcileError> {
        let mut tx = self.pool.begin().await?;
        let Some(local) = lock_by_external(&mut tx, &remote.id).await? else {
            tracing::debug!("update for unknown subscription");
            return Ok(None);
        };

        let (from, to) = match (local.status, remote.cancel_at_period_end) {
            (SubscriptionStatus::Active, true) => {
                (SubscriptionStatus::Active, SubscriptionStatus::Canceling)
            }
            (SubscriptionStatus::Canceling, false) if local.current_period_end > now => {
                (SubscriptionStatus::Canceling, SubscriptionStatus::Active)
            }
            _ => return Ok(None),
        };

        let updated = commit_transition(tx, local.subscription_id, from, to).await?;
        tracing::info!(status = %updated.status, "subscription synced from provider");
        Ok(Some(updated))
    }

    /// Apply a subscription that ended at the provider.
    ///
    /// The row expires; the user's entitlement is cleared unless the
    /// customer holds another live subscription.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Repository` if the store fails.
    #[instrument(skip(self, remote), fields(external_subscription_id = %remote.id))]
    pub async fn apply_provider_deleted(
        &self,
        remote: &ProviderSubscription,
    ) -> Result<bool, ReconcileError> {
        let mut tx = self.pool.begin().await?;
        let Some(owner) = SubscriptionRepository::new(&mut tx)
            .owner_email(&remote.id)
            .await?
        else {
            tracing::debug!("delete for unknown subscription");
            return Ok(false);
        };
        SubscriptionRepository::new(&mut tx)
            .lock_customer(&owner)
            .await?;

        let mut subscriptions = SubscriptionRepository::new(&mut tx);
        let Some(local) = subscriptions.lock_by_external_id(&remote.id).await? else {
            return Ok(false);
        };
        if local.status == SubscriptionStatus::Expired {
            return Ok(false);
        }
        subscriptions
            .transition(local.subscription_id, local.status, SubscriptionStatus::Expired)
            .await?;
        let still_live = subscriptions.lock_live(local.customer_id).await?.is_some();

        let revoked = if still_live {
            false
        } else {
            UserRepository::new(&mut tx).revoke_pro(&owner).await?
        };
        tx.commit().await?;

        tracing::info!(revoked, "subscription ended at provider");
        Ok(true)
    }
}

/// The activation a webhook checkout asks for.
///
/// `None` for sessions that are not paid subscription purchases or lack the
/// email or plan needed to activate.
fn checkout_activation(session: CheckoutSession) -> Option<Activation> {
    if !session.is_subscription() {
        tracing::debug!(session_id = %session.id, "ignoring non-subscription checkout");
        return None;
    }
    if !session.is_complete() {
        tracing::info!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "checkout not paid yet; waiting for the payment to clear"
        );
        return None;
    }
    let Some(email) = session
        .customer_email
        .as_deref()
        .and_then(|raw| Email::parse(raw).ok())
    else {
        tracing::warn!(session_id = %session.id, "checkout has no usable customer email");
        return None;
    };
    let Some(plan) = session.plan.as_deref().and_then(|raw| ProPlan::parse(raw).ok()) else {
        tracing::warn!(session_id = %session.id, "checkout has no usable plan metadata");
        return None;
    };

    Some(Activation {
        email,
        plan,
        session_id: session.id,
        external_subscription_id: session.subscription,
    })
}

/// Check that a provider checkout session vouches for `email`.
fn confirm_checkout(session: &CheckoutSession, email: &Email) -> Result<(), ReconcileError> {
    if !session.is_subscription() {
        return Err(ReconcileError::CheckoutNotConfirmed("not a subscription checkout"));
    }
    if !session.is_complete() {
        return Err(ReconcileError::CheckoutNotConfirmed("checkout is not complete"));
    }
    let session_email = session
        .customer_email
        .as_deref()
        .map(Email::parse)
        .transpose()
        .map_err(|_| ReconcileError::CheckoutNotConfirmed("checkout email is invalid"))?;
    if session_email.is_some_and(|session_email| &session_email != email) {
        return Err(ReconcileError::CheckoutNotConfirmed("checkout belongs to another customer"));
    }
    Ok(())
}

/// Whether a caller-supplied reference names this subscription.
fn matches_ref(subscription: &Subscription, wanted: &str) -> bool {
    let wanted = wanted.trim();
    subscription.subscription_id.to_string() == wanted
        || subscription.external_subscription_id.as_deref() == Some(wanted)
}

/// Take the customer lock and the latest row in `status`.
async fn lock_latest(
    tx: &mut Transaction<'_, Postgres>,
    email: &Email,
    status: SubscriptionStatus,
) -> Result<Option<Subscription>, ReconcileError> {
    SubscriptionRepository::new(tx).lock_customer(email).await?;
    let Some(customer) = CustomerRepository::new(tx).get_by_email(email).await? else {
        return Ok(None);
    };
    let subscription = SubscriptionRepository::new(tx)
        .lock_latest_with_status(customer.customer_id, status)
        .await?;
    Ok(subscription)
}

/// Take the owning customer's lock, then the row for a provider id.
async fn lock_by_external(
    tx: &mut Transaction<'_, Postgres>,
    external_id: &str,
) -> Result<Option<Subscription>, ReconcileError> {
    let mut subscriptions = SubscriptionRepository::new(tx);
    let Some(owner) = subscriptions.owner_email(external_id).await? else {
        return Ok(None);
    };
    subscriptions.lock_customer(&owner).await?;
    Ok(subscriptions.lock_by_external_id(external_id).await?)
}

/// Apply one status transition and commit.
async fn commit_transition(
    mut tx: Transaction<'_, Postgres>,
    subscription_id: SubscriptionId,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
) -> Result<Subscription, RepositoryError> {
    let updated = SubscriptionRepository::new(&mut tx)
        .transition(subscription_id, from, to)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    tx.commit().await?;
    Ok(updated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aurora_core::PlanId;

    use super::*;

    fn subscription(external: Option<&str>) -> Subscription {
        let now = Utc::now();
        Subscription {
            subscription_id: SubscriptionId::generate(),
            customer_id: CustomerId::generate(),
            plan_id: PlanId::generate(),
            provider: PROVIDER_NAME.to_string(),
            external_subscription_id: external.map(str::to_owned),
            external_session_id: Some("cs_1".to_string()),
            status: SubscriptionStatus::Active,
            current_period_end: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_matches_local_or_provider_id() {
        let sub = subscription(Some("sub_123"));
        assert!(matches_ref(&sub, "sub_123"));
        assert!(matches_ref(&sub, &sub.subscription_id.to_string()));
        assert!(!matches_ref(&sub, "sub_999"));
        assert!(!matches_ref(&subscription(None), "sub_123"));
    }

    fn checkout(status: &str, mode: &str, email: Option<&str>) -> CheckoutSession {
        CheckoutSession {
            id: "cs_1".to_string(),
            status: Some(status.to_string()),
            payment_status: Some("paid".to_string()),
            mode: Some(mode.to_string()),
            subscription: Some("sub_1".to_string()),
            customer_email: email.map(str::to_owned),
            plan: Some("monthly".to_string()),
        }
    }

    #[test]
    fn test_confirm_checkout() {
        let email = Email::parse("pro@example.com").unwrap();

        assert!(confirm_checkout(&checkout("complete", "subscription", Some("PRO@example.com")), &email).is_ok());
        assert!(confirm_checkout(&checkout("complete", "subscription", None), &email).is_ok());
        assert!(matches!(
            confirm_checkout(&checkout("open", "subscription", None), &email),
            Err(ReconcileError::CheckoutNotConfirmed(_))
        ));
        assert!(matches!(
            confirm_checkout(&checkout("complete", "payment", None), &email),
            Err(ReconcileError::CheckoutNotConfirmed(_))
        ));
        assert!(matches!(
            confirm_checkout(&checkout("complete", "subscription", Some("other@example.com")), &email),
            Err(ReconcileError::CheckoutNotConfirmed(_))
        ));
    }

    #[test]
    fn test_confirm_checkout_requires_cleared_payment() {
        let email = Email::parse("pro@example.com").unwrap();
        let mut session = checkout("complete", "subscription", None);
        session.payment_status = Some("unpaid".to_string());

        assert!(matches!(
            confirm_checkout(&session, &email),
            Err(ReconcileError::CheckoutNotConfirmed(_))
        ));
    }

    #[test]
    fn test_checkout_activation() {
        let activation =
            checkout_activation(checkout("complete", "subscription", Some("Pro@Example.com")))
                .unwrap();
        assert_eq!(activation.email.as_str(), "pro@example.com");
        assert_eq!(activation.plan, ProPlan::Monthly);
        assert_eq!(activation.session_id, "cs_1");
        assert_eq!(activation.external_subscription_id.as_deref(), Some("sub_1"));

        let mut unpaid = checkout("complete", "subscription", Some("pro@example.com"));
        unpaid.payment_status = Some("unpaid".to_string());
        assert!(checkout_activation(unpaid).is_none());

        assert!(checkout_activation(checkout("open", "subscription", Some("pro@example.com"))).is_none());
        assert!(checkout_activation(checkout("complete", "payment", Some("pro@example.com"))).is_none());
        assert!(checkout_activation(checkout("complete", "subscription", None)).is_none());

        let mut no_plan = checkout("complete", "subscription", Some("pro@example.com"));
        no_plan.plan = Some("weekly".to_string());
        assert!(checkout_activation(no_plan).is_none());
    }

    #[test]
    fn test_repository_conflict_maps_to_conflict() {
        let err = ReconcileError::from(RepositoryError::Conflict("live".into()));
        assert!(matches!(err, ReconcileError::Conflict(message) if message == "live"));
        assert!(matches!(
            ReconcileError::from(RepositoryError::NotFound),
            ReconcileError::Repository(RepositoryError::NotFound)
        ));
    }
}
