//! Aurora Pro subscription route handlers.
//!
//! Every endpoint except the sweep acts on the logged-in user. A body or
//! query `email` is accepted for compatibility but must name that user.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aurora_core::{Email, ProPlan};

use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, SweepToken};
use crate::models::{CurrentUser, SubscriptionView};
use crate::routes::{ApiJson, ApiQuery};
use crate::services::subscriptions::{Activation, ActivationOutcome, SweepReport};
use crate::state::AppState;

/// Activation request body.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub email: Option<String>,
    pub plan: ProPlan,
    pub session_id: String,
    #[serde(alias = "external_subscription_id")]
    pub stripe_subscription_id: Option<String>,
}

/// Cancel request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub email: Option<String>,
    #[serde(alias = "subscription_id")]
    pub subscription_id: Option<String>,
}

/// Reactivate request body.
#[derive(Debug, Default, Deserialize)]
pub struct ReactivateRequest {
    pub email: Option<String>,
}

/// Query parameters for reading the subscription view.
#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub email: Option<String>,
}

/// Result of a cancel or reactivate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub message: &'static str,
    pub current_period_end: DateTime<Utc>,
}

/// Resolve the email to act on, which must be the principal's.
fn acting_email(user: &CurrentUser, requested: Option<&str>) -> Result<Email> {
    let Some(requested) = requested.filter(|email| !email.trim().is_empty()) else {
        return Ok(user.email.clone());
    };
    let requested =
        Email::parse(requested).map_err(|e| AppError::InvalidInput(format!("email: {e}")))?;
    if requested == user.email {
        Ok(requested)
    } else {
        Err(AppError::Unauthorized(
            "email does not belong to the logged-in user".to_string(),
        ))
    }
}

/// Activate or renew Aurora Pro from a completed checkout.
///
/// The checkout session is confirmed with the billing provider before any
/// local write.
#[instrument(skip(state, user, body), fields(user_id = %user.id, plan = %body.plan))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<UpdateRequest>,
) -> Result<Json<ActivationOutcome>> {
    let email = acting_email(&user, body.email.as_deref())?;
    let session_id = body.session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::InvalidInput("session_id is required".to_string()));
    }

    let outcome = state
        .reconciler()
        .activate_confirmed(
            Activation {
                email,
                plan: body.plan,
                session_id: session_id.to_owned(),
                external_subscription_id: body
                    .stripe_subscription_id
                    .filter(|id| !id.trim().is_empty()),
            },
            Utc::now(),
        )
        .await?;

    Ok(Json(outcome))
}

/// Stop renewal at the end of the current period.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<CancelRequest>,
) -> Result<Json<TransitionResponse>> {
    let email = acting_email(&user, body.email.as_deref())?;
    let subscription = state
        .reconciler()
        .cancel(&email, body.subscription_id.as_deref())
        .await?;

    Ok(Json(TransitionResponse {
        message: "Subscription will be canceled at the end of the billing period",
        current_period_end: subscription.current_period_end,
    }))
}

/// Resume renewal of a subscription that is set to cancel.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn reactivate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<ReactivateRequest>,
) -> Result<Json<TransitionResponse>> {
    let email = acting_email(&user, body.email.as_deref())?;
    let subscription = state.reconciler().reactivate(&email, Utc::now()).await?;

    Ok(Json(TransitionResponse {
        message: "Subscription reactivated",
        current_period_end: subscription.current_period_end,
    }))
}

/// Read the derived subscription view.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<ViewQuery>,
) -> Result<Json<SubscriptionView>> {
    let email = acting_email(&user, query.email.as_deref())?;
    let view = state.reconciler().read(&email, Utc::now()).await?;
    Ok(Json(view))
}

/// Expire every lapsed entitlement. Operator endpoint.
#[instrument(skip(state, _token))]
pub async fn sweep_expired(
    State(state): State<AppState>,
    _token: SweepToken,
) -> Result<Json<SweepReport>> {
    let report = state
        .reconciler()
        .sweep_expired(Utc::now(), state.config().sweep.batch_size)
        .await?;
    tracing::info!(count = report.count, "expiry sweep requested");
    Ok(Json(report))
}
