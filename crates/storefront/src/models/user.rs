//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use aurora_core::{Email, ProPlan, UserId, is_entitled};

/// A login principal and its Aurora Pro entitlement.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login email, also the customer natural key.
    pub email: Email,
    /// Display name.
    pub username: String,
    /// Whether the user holds Aurora Pro.
    pub is_pro: bool,
    /// Plan backing the entitlement.
    pub pro_plan: Option<ProPlan>,
    /// Entitlement expiry.
    pub pro_valid: Option<DateTime<Utc>>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the entitlement is in force at `now`.
    #[must_use]
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        is_entitled(self.is_pro, self.pro_valid, now)
    }
}

/// Public profile returned by `GET /account`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    pub is_pro: bool,
    pub pro_plan: Option<ProPlan>,
    pub pro_valid: Option<DateTime<Utc>>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            is_pro: user.is_pro,
            pro_plan: user.pro_plan,
            pro_valid: user.pro_valid,
        }
    }
}
