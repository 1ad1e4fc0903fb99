//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use aurora_core::{Email, ProPlan, UserId};

use super::RepositoryError;
use crate::models::User;

/// A user row together with its password hash.
#[derive(sqlx::FromRow)]
struct UserWithHash {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> UserRepository<'c> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r"
            SELECT id, email, username, is_pro, pro_plan, pro_valid, created_at, updated_at
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(user)
    }

    /// Get a user by email and lock the row until the transaction ends.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r"
            SELECT id, email, username, is_pro, pro_plan, pro_valid, created_at, updated_at
            FROM users
            WHERE email = $1
            FOR UPDATE
            ",
        )
        .bind(email)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(user)
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r"
            SELECT id, email, username, is_pro, pro_plan, pro_valid, created_at, updated_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(user)
    }

    /// Create a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &mut self,
        email: &Email,
        username: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(
            r"
            INSERT INTO users (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, username, is_pro, pro_plan, pro_valid, created_at, updated_at
            ",
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "email already exists"))
    }

    /// Get a user along with their password hash for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &mut self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHash>(
            r"
            SELECT id, email, username, is_pro, pro_plan, pro_valid, created_at, updated_at,
                   password_hash
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row.map(|r| (r.user, r.password_hash)))
    }

    /// Update a user's display name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_username(
        &mut self,
        id: UserId,
        username: &str,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(
            r"
            UPDATE users
            SET username = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, username, is_pro, pro_plan, pro_valid, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(username)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Grant Aurora Pro until `pro_valid`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn grant_pro(
        &mut self,
        id: UserId,
        plan: ProPlan,
        pro_valid: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET is_pro = TRUE, pro_plan = $2, pro_valid = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(plan)
        .bind(pro_valid)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove Aurora Pro from a user. `pro_valid` is kept for history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revoke_pro(&mut self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET is_pro = FALSE, pro_plan = NULL, updated_at = NOW()
            WHERE email = $1 AND is_pro
            ",
        )
        .bind(email)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke Pro from up to `limit` users whose entitlement lapsed before `now`.
    ///
    /// Users with no recorded expiry count as lapsed. Rows locked by a
    /// concurrent sweep are skipped. Returns the affected emails.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn expire_batch(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Email>, RepositoryError> {
        let emails = sqlx::query_scalar::<_, Email>(
            r"
            UPDATE users
            SET is_pro = FALSE, pro_plan = NULL, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM users
                WHERE is_pro AND (pro_valid IS NULL OR pro_valid < $1)
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING email
            ",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(emails)
    }
}
