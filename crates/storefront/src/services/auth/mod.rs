//! Authentication service.
//!
//! Password login for storefront users. Users carry the Aurora Pro
//! entitlement; the customer record behind a user is resolved separately.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;
use tracing::instrument;

use aurora_core::{Email, UserId};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length, in characters.
const MAX_USERNAME_LENGTH: usize = 64;

/// Authentication service.
///
/// Handles user registration, login and profile updates.
pub struct AuthService<'a> {
    pool: &'a PgPool,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn register_with_password(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let username = validate_username(username)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;

        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let user = UserRepository::new(&mut conn)
            .create(&email, username, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let (user, password_hash) = UserRepository::new(&mut conn)
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        drop(conn);

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Load the current user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user was deleted.
    pub async fn get_user(&self, id: UserId) -> Result<User, AuthError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        UserRepository::new(&mut conn)
            .get_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change the user's display name.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername` for blank or overlong names and
    /// `AuthError::UserNotFound` if the user was deleted.
    #[instrument(skip(self))]
    pub async fn update_username(&self, id: UserId, username: &str) -> Result<User, AuthError> {
        let username = validate_username(username)?;

        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        UserRepository::new(&mut conn)
            .update_username(id, username)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Trim and bound a display name.
fn validate_username(username: &str) -> Result<&str, AuthError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidUsername("username is required".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(AuthError::InvalidUsername(format!(
            "username must be at most {MAX_USERNAME_LENGTH} characters"
        )));
    }
    Ok(username)
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("eightchr").is_ok());
    }

    #[test]
    fn test_username_is_trimmed_and_bounded() {
        assert_eq!(validate_username("  ada ").unwrap(), "ada");
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_garbage_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("whatever1", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
