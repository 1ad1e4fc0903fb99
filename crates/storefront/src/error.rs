//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Responses are JSON: `{"error": "<stable code>", "message": "<text>"}`.
//! Server-side causes are logged and reported, never sent to clients.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::billing::BillingError;
use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::orders::OrderError;
use crate::services::subscriptions::ReconcileError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed request fields.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A referenced row (variant, cart, customer) does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A uniqueness rule rejected the request.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Billing provider call failed or timed out.
    #[error("External provider error: {0}")]
    ExternalProvider(#[from] BillingError),

    /// Persistence layer failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] RepositoryError),

    /// Writing an order failed; nothing was committed.
    #[error("Order creation failed: {0}")]
    OrderCreationFailed(RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error originates on the server and should be reported.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::ExternalProvider(_)
                | Self::StoreUnavailable(_)
                | Self::OrderCreationFailed(_)
                | Self::Internal(_)
                | Self::Auth(AuthError::Repository(_) | AuthError::PasswordHash)
        )
    }

    /// HTTP status and stable error code.
    const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Self::InvalidReference(_) => (StatusCode::BAD_REQUEST, "invalid_reference"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::ExternalProvider(_) => (StatusCode::BAD_GATEWAY, "external_provider_error"),
            Self::StoreUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable"),
            Self::OrderCreationFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "order_creation_failed")
            }
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound => {
                    (StatusCode::UNAUTHORIZED, "unauthorized")
                }
                AuthError::UserAlreadyExists => (StatusCode::CONFLICT, "conflict"),
                AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::InvalidUsername(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                AuthError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable"),
                AuthError::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Client-facing message.
    fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(msg)
            | Self::InvalidReference(msg)
            | Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::ExternalProvider(BillingError::Timeout) => {
                "Billing provider timed out".to_string()
            }
            Self::ExternalProvider(_) => "Billing provider error".to_string(),
            Self::StoreUnavailable(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::OrderCreationFailed(_) => "Order could not be created".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound => {
                    "Invalid credentials".to_string()
                }
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) | AuthError::InvalidUsername(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    "Internal server error".to_string()
                }
            },
            Self::RateLimited => "Too many requests".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, code) = self.status_and_code();
        let body = json!({ "error": code, "message": self.public_message() });

        (status, Json(body)).into_response()
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::UnknownVariant | CartError::UnknownCart | CartError::UnknownCustomer => {
                Self::InvalidReference(err.to_string())
            }
            CartError::QuantityLimit { .. } => Self::InvalidInput(err.to_string()),
            CartError::Repository(e) => Self::StoreUnavailable(e),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::MissingEmail
            | OrderError::QuantityLimit { .. }
            | OrderError::TotalBelowSubtotal { .. } => Self::InvalidInput(err.to_string()),
            OrderError::UnknownItem { .. } => Self::InvalidReference(err.to_string()),
            OrderError::NotFound => Self::NotFound(err.to_string()),
            OrderError::Persistence(e) => Self::OrderCreationFailed(e),
            OrderError::Read(e) => Self::StoreUnavailable(e),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UserNotFound | ReconcileError::SubscriptionNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            ReconcileError::CheckoutNotConfirmed(_) => Self::InvalidInput(err.to_string()),
            ReconcileError::Conflict(msg) => Self::Conflict(msg),
            ReconcileError::Provider(e) => Self::ExternalProvider(e),
            ReconcileError::Repository(e) => Self::StoreUnavailable(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a storefront action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::InvalidInput("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::InvalidReference("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("x".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::ExternalProvider(BillingError::Timeout)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::StoreUnavailable(RepositoryError::NotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(get_status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_service_errors_map_to_taxonomy() {
        assert!(matches!(
            AppError::from(CartError::UnknownVariant),
            AppError::InvalidReference(_)
        ));
        assert!(matches!(
            AppError::from(CartError::QuantityLimit { max: 9_999 }),
            AppError::InvalidInput(_)
        ));
        assert!(matches!(
            AppError::from(OrderError::Persistence(RepositoryError::NotFound)),
            AppError::OrderCreationFailed(_)
        ));
        assert!(matches!(
            AppError::from(OrderError::Read(RepositoryError::NotFound)),
            AppError::StoreUnavailable(_)
        ));
        assert!(matches!(
            AppError::from(OrderError::UnknownItem { index: 1 }),
            AppError::InvalidReference(_)
        ));
        assert!(matches!(
            AppError::from(ReconcileError::SubscriptionNotFound("none")),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(ReconcileError::Provider(BillingError::Timeout)),
            AppError::ExternalProvider(BillingError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_body_hides_internal_cause() {
        let err = AppError::StoreUnavailable(RepositoryError::DataCorruption(
            "secret table detail".to_string(),
        ));
        let body = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["error"], "store_unavailable");
        assert!(!json["message"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn test_body_carries_validation_message() {
        let err = AppError::InvalidInput("qty must be positive".to_string());
        let body = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["error"], "invalid_input");
        assert_eq!(json["message"], "qty must be positive");
    }
}
