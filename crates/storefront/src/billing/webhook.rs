//! Webhook signature verification and event decoding.
//!
//! Signature header format: `t=<unix seconds>,v1=<hex hmac-sha256>`, where the
//! MAC covers `"<t>.<raw body>"`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{BillingError, ProviderSubscription};
use super::stripe::StripeSubscription;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed event.
pub const TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for timestamps from the future.
const FUTURE_SKEW_SECS: i64 = 60;

/// Verify a webhook signature against the raw request body.
///
/// Any `v1` entry may match, so the provider can roll secrets.
///
/// # Errors
///
/// Returns `BillingError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance, or no signature matches.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    let timestamp_str = timestamp.ok_or(BillingError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature("missing v1 signature"));
    }

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| BillingError::InvalidSignature("invalid timestamp"))?;
    let age = now_unix - timestamp;
    if age > TOLERANCE_SECS {
        return Err(BillingError::InvalidSignature("timestamp too old"));
    }
    if age < -FUTURE_SKEW_SECS {
        return Err(BillingError::InvalidSignature("timestamp in the future"));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::InvalidSignature("unusable webhook secret"))?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let expected = expected.as_bytes();

    // Signature length is not secret; only the content comparison must be constant time
    let matched = signatures
        .iter()
        .map(|sig| sig.as_bytes())
        .filter(|sig| sig.len() == expected.len())
        .fold(false, |found, sig| found | bool::from(expected.ct_eq(sig)));

    if matched {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature("signature mismatch"))
    }
}

/// Decoded webhook event, limited to the types the storefront acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A checkout session finished, or its delayed payment cleared.
    CheckoutCompleted(CheckoutSession),
    /// A subscription changed at the provider.
    SubscriptionUpdated(ProviderSubscription),
    /// A subscription ended at the provider.
    SubscriptionDeleted(ProviderSubscription),
    /// Anything else; acknowledged and ignored.
    Ignored(String),
}

/// The fields of a completed checkout session the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: Option<String>,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer_email: Option<String>,
    pub plan: Option<String>,
}

impl CheckoutSession {
    /// Whether this session purchased a subscription.
    #[must_use]
    pub fn is_subscription(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }

    /// Whether the customer finished checkout and the payment cleared.
    ///
    /// Delayed payment methods complete the session with payment still
    /// `unpaid`; those count only once the provider reports them paid.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
            && matches!(
                self.payment_status.as_deref(),
                Some("paid" | "no_payment_required")
            )
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
pub(crate) struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<RawCustomerDetails>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Deserialize)]
struct RawCustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RawMetadata {
    #[serde(default)]
    plan: Option<String>,
}

/// Decode a verified webhook body.
///
/// # Errors
///
/// Returns `BillingError::Parse` if the body or a handled event's object
/// does not have the expected shape.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, BillingError> {
    let event: RawEvent =
        serde_json::from_slice(payload).map_err(|e| BillingError::Parse(e.to_string()))?;
    let object = event.data.object;

    let decoded = match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let raw: RawCheckoutSession =
                serde_json::from_value(object).map_err(|e| BillingError::Parse(e.to_string()))?;
            WebhookEvent::CheckoutCompleted(raw.into())
        }
        "customer.subscription.updated" => WebhookEvent::SubscriptionUpdated(subscription(object)?),
        "customer.subscription.deleted" => WebhookEvent::SubscriptionDeleted(subscription(object)?),
        _ => WebhookEvent::Ignored(event.event_type),
    };

    Ok(decoded)
}

impl From<RawCheckoutSession> for CheckoutSession {
    fn from(raw: RawCheckoutSession) -> Self {
        let customer_email = raw
            .customer_email
            .or_else(|| raw.customer_details.and_then(|d| d.email));
        Self {
            id: raw.id,
            status: raw.status,
            payment_status: raw.payment_status,
            mode: raw.mode,
            subscription: raw.subscription,
            customer_email,
            plan: raw.metadata.and_then(|m| m.plan),
        }
    }
}

fn subscription(object: serde_json::Value) -> Result<ProviderSubscription, BillingError> {
    serde_json::from_value::<StripeSubscription>(object)
        .map(ProviderSubscription::from)
        .map_err(|e| BillingError::Parse(e.to_string()))
}

/// Build a signature header for `payload`.
///
/// Used by tests and local tooling that replays events.
///
/// # Errors
///
/// Returns `BillingError::InvalidSignature` if the secret is unusable.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, BillingError> {
    let signed = timestamp.to_string();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::InvalidSignature("unusable webhook secret"))?;
    mac.update(signed.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!("t={signed},v1={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_Hn3Vq8Wd5Ys0Pj6G";
    const NOW: i64 = 1_719_792_000;

    #[test]
    fn test_valid_signature() {
        let body = br#"{"type":"ping"}"#;
        let header = sign(body, SECRET, NOW - 10).unwrap();
        assert!(verify_signature(body, &header, SECRET, NOW).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body() {
        let header = sign(br#"{"amount":1}"#, SECRET, NOW).unwrap();
        let err = verify_signature(br#"{"amount":9}"#, &header, SECRET, NOW).unwrap_err();
        assert!(matches!(err, BillingError::InvalidSignature("signature mismatch")));
    }

    #[test]
    fn test_rejects_stale_and_future_timestamps() {
        let body = b"{}";
        let stale = sign(body, SECRET, NOW - TOLERANCE_SECS - 1).unwrap();
        assert!(verify_signature(body, &stale, SECRET, NOW).is_err());

        let future = sign(body, SECRET, NOW + 120).unwrap();
        assert!(verify_signature(body, &future, SECRET, NOW).is_err());
    }

    #[test]
    fn test_rejects_malformed_header() {
        assert!(verify_signature(b"{}", "v1=abc", SECRET, NOW).is_err());
        assert!(verify_signature(b"{}", "t=abc,v1=abc", SECRET, NOW).is_err());
        assert!(verify_signature(b"{}", &format!("t={NOW}"), SECRET, NOW).is_err());
    }

    #[test]
    fn test_any_v1_may_match() {
        let body = b"{}";
        let good = sign(body, SECRET, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig}", "0".repeat(64));
        assert!(verify_signature(body, &header, SECRET, NOW).is_ok());
    }

    #[test]
    fn test_parse_checkout_completed() {
        let body = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_1",
                "status": "complete",
                "payment_status": "paid",
                "mode": "subscription",
                "subscription": "sub_1",
                "customer_email": null,
                "customer_details": {"email": "Pro@Example.com"},
                "metadata": {"plan": "annual"}
            }}
        }"#;
        let WebhookEvent::CheckoutCompleted(session) = parse_event(body).unwrap() else {
            panic!("expected checkout event");
        };
        assert!(session.is_subscription());
        assert!(session.is_complete());
        assert_eq!(session.customer_email.as_deref(), Some("Pro@Example.com"));
        assert_eq!(session.plan.as_deref(), Some("annual"));
        assert_eq!(session.subscription.as_deref(), Some("sub_1"));
    }

    #[test]
    fn test_delayed_payment_completes_only_when_paid() {
        let pending = br#"{"type":"checkout.session.completed","data":{"object":
            {"id":"cs_ach","status":"complete","payment_status":"unpaid","mode":"subscription"}}}"#;
        let WebhookEvent::CheckoutCompleted(session) = parse_event(pending).unwrap() else {
            panic!("expected checkout event");
        };
        assert!(!session.is_complete());

        let cleared = br#"{"type":"checkout.session.async_payment_succeeded","data":{"object":
            {"id":"cs_ach","status":"complete","payment_status":"paid","mode":"subscription"}}}"#;
        let WebhookEvent::CheckoutCompleted(session) = parse_event(cleared).unwrap() else {
            panic!("expected checkout event");
        };
        assert!(session.is_complete());
    }

    #[test]
    fn test_parse_subscription_events() {
        let body = br#"{"type":"customer.subscription.deleted","data":{"object":
            {"id":"sub_1","status":"canceled","cancel_at_period_end":false,"current_period_end":"bogus"}}}"#;
        let WebhookEvent::SubscriptionDeleted(sub) = parse_event(body).unwrap() else {
            panic!("expected delete event");
        };
        // Unparsable timestamps decode as unknown
        assert!(sub.current_period_end.is_none());

        let body = br#"{"type":"customer.subscription.updated","data":{"object":
            {"id":"sub_1","status":"active","cancel_at_period_end":true}}}"#;
        let WebhookEvent::SubscriptionUpdated(sub) = parse_event(body).unwrap() else {
            panic!("expected update event");
        };
        assert!(sub.cancel_at_period_end);
        assert!(sub.current_period_end.is_none());
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let body = br#"{"type":"invoice.paid","data":{"object":{}}}"#;
        assert_eq!(
            parse_event(body).unwrap(),
            WebhookEvent::Ignored("invoice.paid".to_string())
        );
    }
}
