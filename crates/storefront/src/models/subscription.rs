//! Subscription rows and the derived display view.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use aurora_core::{
    CustomerId, EntitlementStatus, PlanId, ProPlan, SubscriptionId, SubscriptionStatus,
    entitlement_status,
};

/// Stored subscription.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub provider: String,
    pub external_subscription_id: Option<String>,
    pub external_session_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response body of `GET /subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub status: EntitlementStatus,
    pub plan: Option<ProPlan>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub subscription_id: Option<SubscriptionId>,
}

impl SubscriptionView {
    /// Derive the view for a user.
    ///
    /// `period_end` is the user's entitlement expiry; the period start is one
    /// plan interval earlier and is never stored.
    #[must_use]
    pub fn derive(
        entitled: bool,
        plan: Option<ProPlan>,
        period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: bool,
    ) -> Self {
        let current_period_start = match (plan, period_end) {
            (Some(plan), Some(end)) => Some(plan.period_start(end)),
            _ => None,
        };
        Self {
            status: entitlement_status(entitled, cancel_at_period_end),
            plan,
            amount: None,
            currency: None,
            current_period_start,
            current_period_end: period_end,
            cancel_at_period_end,
            subscription_id: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_derive_canceling_view() {
        let end = Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap();
        let view = SubscriptionView::derive(true, Some(ProPlan::Monthly), Some(end), true);

        assert_eq!(view.status, EntitlementStatus::Canceling);
        assert_eq!(
            view.current_period_start,
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(view.current_period_end, Some(end));
    }

    #[test]
    fn test_derive_expired_ignores_cancel_flag() {
        let view = SubscriptionView::derive(false, Some(ProPlan::Annual), None, true);
        assert_eq!(view.status, EntitlementStatus::Expired);
        assert!(view.current_period_start.is_none());
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let view = SubscriptionView::derive(true, Some(ProPlan::Annual), Some(end), false);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["status"], "active");
        assert_eq!(json["plan"], "annual");
        assert_eq!(json["cancelAtPeriodEnd"], false);
        assert!(json.get("currentPeriodStart").is_some());
    }
}
