//! Authentication route handlers.
//!
//! Password login backed by the local `users` table. The session carries
//! a [`CurrentUser`] once login or registration succeeds.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::{CurrentUser, Profile, User};
use crate::routes::ApiJson;
use crate::services::auth::AuthService;
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Store the user in the session and tag error reports with it.
async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user))
        .await
        .map_err(|e| AppError::Internal(format!("session write failed: {e}")))?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Register and log in.
#[instrument(skip(state, session, body))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Profile>)> {
    let user = AuthService::new(state.pool())
        .register_with_password(&body.email, &body.username, &body.password)
        .await?;

    start_session(&session, &user).await?;
    add_breadcrumb("auth", "User registered", None);

    Ok((StatusCode::CREATED, Json(Profile::from(user))))
}

/// Log in with email and password.
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Profile>> {
    let user = AuthService::new(state.pool())
        .login_with_password(&body.email, &body.password)
        .await
        .inspect_err(|e| tracing::info!(error = %e, "login rejected"))?;

    start_session(&session, &user).await?;
    add_breadcrumb("auth", "User logged in", None);

    Ok(Json(Profile::from(user)))
}

/// Log out and drop the session.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session flush failed: {e}")))?;
    clear_sentry_user();

    Ok(StatusCode::NO_CONTENT)
}
