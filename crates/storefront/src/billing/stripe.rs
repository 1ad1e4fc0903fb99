//! Stripe REST client for the subscription contract.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::webhook::RawCheckoutSession;
use super::{BillingError, BillingProvider, CheckoutSession, ProviderSubscription, timestamp};
use crate::config::BillingConfig;

/// Subscription object as returned by the API.
#[derive(Debug, Deserialize)]
pub(crate) struct StripeSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub current_period_end: Option<i64>,
}

/// Accept any JSON value for a timestamp; non-integers become `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64()))
}

impl From<StripeSubscription> for ProviderSubscription {
    fn from(sub: StripeSubscription) -> Self {
        Self {
            id: sub.id,
            status: sub.status,
            cancel_at_period_end: sub.cancel_at_period_end,
            current_period_end: timestamp(sub.current_period_end),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: Url,
}

impl StripeClient {
    /// Create a new client.
    ///
    /// The configured timeout bounds every request, connect included.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let mut headers = HeaderMap::new();

        let mut auth_value =
            HeaderValue::from_str(&format!("Bearer {}", config.secret_key.expose_secret()))
                .map_err(|e| BillingError::Parse(format!("Invalid API key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }

    fn resource_url(&self, collection: &[&str], id: &str) -> Result<Url, BillingError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| BillingError::Parse("billing API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(collection)
            .push(id);
        Ok(url)
    }

    fn subscription_url(&self, subscription_id: &str) -> Result<Url, BillingError> {
        self.resource_url(&["subscriptions"], subscription_id)
    }

    /// Decode a success body, or turn an error body into `BillingError::Api`.
    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BillingError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            return Err(BillingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BillingError::Parse(e.to_string()))
    }
}

fn classify(e: reqwest::Error) -> BillingError {
    if e.is_timeout() {
        BillingError::Timeout
    } else {
        BillingError::Request(e)
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    #[instrument(skip(self))]
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        let url = self.subscription_url(subscription_id)?;
        let flag = if cancel { "true" } else { "false" };

        let response = self
            .client
            .post(url)
            .form(&[("cancel_at_period_end", flag)])
            .send()
            .await
            .map_err(classify)?;

        Self::read::<StripeSubscription>(response).await.map(Into::into)
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, subscription_id: &str) -> Result<ProviderSubscription, BillingError> {
        let url = self.subscription_url(subscription_id)?;
        let response = self.client.get(url).send().await.map_err(classify)?;

        Self::read::<StripeSubscription>(response).await.map(Into::into)
    }

    #[instrument(skip(self))]
    async fn checkout_session(&self, session_id: &str) -> Result<CheckoutSession, BillingError> {
        let url = self.resource_url(&["checkout", "sessions"], session_id)?;
        let response = self.client.get(url).send().await.map_err(classify)?;

        Self::read::<RawCheckoutSession>(response).await.map(Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;

    fn client(base: &str) -> StripeClient {
        StripeClient::new(&BillingConfig {
            api_base: Url::parse(base).unwrap(),
            secret_key: SecretString::from("sk_live_9fQ2xLm4Zr7Tb1Kc"),
            webhook_secret: SecretString::from("whsec_Hn3Vq8Wd5Ys0Pj6G"),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn test_subscription_url_joins_segments() {
        let stripe = client("https://api.stripe.com/v1");
        assert_eq!(
            stripe.subscription_url("sub_123").unwrap().as_str(),
            "https://api.stripe.com/v1/subscriptions/sub_123"
        );

        let trailing = client("https://api.stripe.com/v1/");
        assert_eq!(
            trailing.subscription_url("sub_123").unwrap().as_str(),
            "https://api.stripe.com/v1/subscriptions/sub_123"
        );
    }

    #[test]
    fn test_checkout_session_url() {
        let stripe = client("https://api.stripe.com/v1");
        assert_eq!(
            stripe
                .resource_url(&["checkout", "sessions"], "cs_test_1")
                .unwrap()
                .as_str(),
            "https://api.stripe.com/v1/checkout/sessions/cs_test_1"
        );
    }

    #[test]
    fn test_subscription_url_escapes_id() {
        let stripe = client("https://api.stripe.com/v1");
        let url = stripe.subscription_url("sub/../charges").unwrap();
        assert!(url.as_str().ends_with("/subscriptions/sub%2F..%2Fcharges"));
    }

    #[test]
    fn test_stripe_subscription_conversion() {
        let raw: StripeSubscription = serde_json::from_str(
            r#"{"id":"sub_1","status":"active","cancel_at_period_end":true,"current_period_end":1719792000}"#,
        )
        .unwrap();
        let sub = ProviderSubscription::from(raw);
        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.current_period_end.unwrap().timestamp(), 1_719_792_000);
    }
}
