//! Bearer-token guard for operator endpoints.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::AppState;

/// Extractor that admits requests carrying the sweep bearer token.
pub struct SweepToken;

impl FromRequestParts<AppState> for SweepToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| AppError::Unauthorized("bearer token required".to_string()))?;

        if token_matches(presented, state.config().sweep.bearer_token.expose_secret()) {
            Ok(Self)
        } else {
            tracing::warn!("rejected sweep request with wrong token");
            Err(AppError::Unauthorized("invalid bearer token".to_string()))
        }
    }
}

/// Constant-time token comparison; only the length can leak.
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches("s3cr3t-token", "s3cr3t-token"));
        assert!(!token_matches("s3cr3t-tokem", "s3cr3t-token"));
        assert!(!token_matches("short", "s3cr3t-token"));
        assert!(!token_matches("", "s3cr3t-token"));
    }
}
