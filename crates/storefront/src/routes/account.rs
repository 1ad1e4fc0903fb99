//! Account route handlers.
//!
//! These routes require authentication.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use aurora_core::CustomerId;

use crate::error::{AppError, Result};
use crate::middleware::{RequireAuth, set_current_user};
use crate::models::{CurrentUser, Profile};
use crate::routes::ApiJson;
use crate::services::auth::AuthService;
use crate::services::identity::IdentityResolver;
use crate::state::AppState;

/// Profile update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: String,
}

/// Response for a customer sync.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSynced {
    pub customer_id: CustomerId,
}

/// Show the logged-in user's profile.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Profile>> {
    let user = AuthService::new(state.pool()).get_user(user.id).await?;
    Ok(Json(Profile::from(user)))
}

/// Change the display name.
///
/// The session copy is refreshed so order names pick up the change.
#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<Json<Profile>> {
    let updated = AuthService::new(state.pool())
        .update_username(user.id, &body.username)
        .await?;

    set_current_user(&session, &CurrentUser::from(&updated))
        .await
        .map_err(|e| AppError::Internal(format!("session write failed: {e}")))?;

    Ok(Json(Profile::from(updated)))
}

/// Resolve (or create) the durable customer record for the logged-in user.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn sync_customer(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CustomerSynced>> {
    let customer = IdentityResolver::new(state.pool())
        .resolve(&user.email, Some(&user.username))
        .await?;

    Ok(Json(CustomerSynced {
        customer_id: customer.customer_id,
    }))
}
