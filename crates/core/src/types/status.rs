//! Status enums for carts, orders, payments, addresses and subscriptions.
//!
//! Each enum is stored as `TEXT` with a matching `CHECK` constraint in the
//! storefront migrations.

text_enum! {
    /// Cart lifecycle status.
    pub enum CartStatus {
        /// Cart is open for mutations.
        Active => "active",
        /// Cart was left behind; kept for reporting only.
        Abandoned => "abandoned",
    }
}

text_enum! {
    /// Order status.
    ///
    /// Orders are created `paid`; later transitions are driven by fulfillment
    /// and refund events handled outside the storefront.
    pub enum OrderStatus {
        Pending => "pending",
        Paid => "paid",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

text_enum! {
    /// Payment record status.
    pub enum PaymentStatus {
        Pending => "pending",
        Succeeded => "succeeded",
        Failed => "failed",
        Refunded => "refunded",
    }
}

text_enum! {
    /// Kind of a customer address.
    pub enum AddressKind {
        Shipping => "shipping",
        Billing => "billing",
    }
}

text_enum! {
    /// Local lifecycle status of a subscription.
    pub enum SubscriptionStatus {
        /// Renewing normally.
        Active => "active",
        /// Entitled until period end; renewal suppressed at the provider.
        Canceling => "canceling",
        /// Entitlement has lapsed.
        Expired => "expired",
        /// Provider-side trial.
        Trialing => "trialing",
    }
}

impl SubscriptionStatus {
    /// Statuses of which a customer may hold at most one at a time.
    pub const LIVE: [Self; 2] = [Self::Active, Self::Trialing];

    /// Statuses the expiry sweep moves to `expired`.
    pub const SWEEPABLE: [Self; 2] = [Self::Active, Self::Canceling];

    /// Whether this status counts against the one-live-subscription rule.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }

    /// Whether a subscription in this status can be canceled at period end.
    #[must_use]
    pub const fn can_cancel(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether a subscription in this status can be reactivated.
    #[must_use]
    pub const fn can_reactivate(self) -> bool {
        matches!(self, Self::Canceling)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_text_roundtrip_for_every_variant() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), *status);
        }
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = "cancelled".parse::<SubscriptionStatus>().unwrap_err();
        assert_eq!(err.kind, "SubscriptionStatus");
        assert_eq!(err.value, "cancelled");
    }

    #[test]
    fn test_serde_uses_stored_strings() {
        let json = serde_json::to_string(&SubscriptionStatus::Canceling).unwrap();
        assert_eq!(json, "\"canceling\"");

        let kind: AddressKind = serde_json::from_str("\"billing\"").unwrap();
        assert_eq!(kind, AddressKind::Billing);

        assert!(serde_json::from_str::<PaymentStatus>("\"paid\"").is_err());
    }

    #[test]
    fn test_transition_guards() {
        assert!(SubscriptionStatus::Active.can_cancel());
        assert!(!SubscriptionStatus::Canceling.can_cancel());
        assert!(!SubscriptionStatus::Trialing.can_cancel());

        assert!(SubscriptionStatus::Canceling.can_reactivate());
        assert!(!SubscriptionStatus::Active.can_reactivate());
        assert!(!SubscriptionStatus::Expired.can_reactivate());
    }

    #[test]
    fn test_live_statuses() {
        assert!(SubscriptionStatus::Active.is_live());
        assert!(SubscriptionStatus::Trialing.is_live());
        assert!(!SubscriptionStatus::Canceling.is_live());
        assert!(!SubscriptionStatus::Expired.is_live());
    }
}
