//! Billing provider integration.
//!
//! The storefront relies on a narrow contract: update a subscription's
//! `cancel_at_period_end` flag, retrieve a subscription, and retrieve a
//! checkout session to confirm a purchase. Everything else about the provider
//! is its own business.

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use stripe::StripeClient;
pub use webhook::CheckoutSession;

/// Provider name recorded on payments and subscriptions.
pub const PROVIDER_NAME: &str = "stripe";

/// Errors that can occur when talking to the billing provider.
#[derive(Debug, Error)]
pub enum BillingError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),

    /// The call did not finish within the configured bound.
    #[error("billing provider timed out")]
    Timeout,

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response or event.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Webhook signature missing, malformed, stale or wrong.
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(&'static str),
}

/// The provider's view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    /// `None` when absent or not a valid timestamp.
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Operations the reconciler needs from the billing provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Set or clear cancel-at-period-end on a subscription.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Fetch a subscription.
    async fn retrieve(&self, subscription_id: &str) -> Result<ProviderSubscription, BillingError>;

    /// Fetch a checkout session.
    async fn checkout_session(&self, session_id: &str) -> Result<CheckoutSession, BillingError>;
}

/// Convert provider epoch seconds, treating garbage as unknown.
pub(crate) fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}
