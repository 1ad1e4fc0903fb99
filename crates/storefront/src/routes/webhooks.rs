//! Billing provider webhook receiver.
//!
//! Events are verified against the raw body before decoding. Store failures
//! answer 5xx so the provider redelivers; events that cannot apply here are
//! acknowledged.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::instrument;

use crate::billing::webhook::{SIGNATURE_HEADER, WebhookEvent, parse_event, verify_signature};
use crate::error::{AppError, Result};
use crate::services::subscriptions::ReconcileError;
use crate::state::AppState;

/// Receive a signed billing event.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn billing(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidInput("missing webhook signature".to_string()))?;

    verify_signature(
        &body,
        signature,
        state.config().billing.webhook_secret.expose_secret(),
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "rejected webhook");
        AppError::InvalidInput("invalid webhook signature".to_string())
    })?;

    let event = parse_event(&body).map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let reconciler = state.reconciler();
    let now = Utc::now();

    match event {
        WebhookEvent::CheckoutCompleted(session) => {
            let session_id = session.id.clone();
            match reconciler.apply_checkout(session, now).await {
                Ok(Some(outcome)) => tracing::info!(
                    %session_id,
                    subscription_id = %outcome.subscription_id,
                    replayed = outcome.replayed,
                    "checkout applied"
                ),
                Ok(None) => tracing::debug!(%session_id, "checkout not applicable"),
                Err(ReconcileError::UserNotFound) => {
                    tracing::warn!(%session_id, "checkout for unknown user acknowledged");
                }
                Err(e) => return Err(e.into()),
            }
        }
        WebhookEvent::SubscriptionUpdated(remote) => {
            reconciler.apply_provider_update(&remote, now).await?;
        }
        WebhookEvent::SubscriptionDeleted(remote) => {
            reconciler.apply_provider_deleted(&remote).await?;
        }
        WebhookEvent::Ignored(event_type) => {
            tracing::debug!(%event_type, "ignoring webhook event");
        }
    }

    Ok(Json(json!({ "received": true })))
}
