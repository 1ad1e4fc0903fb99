//! Customers and their addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aurora_core::{CustomerId, Email};

/// A billing/shipping identity keyed by email.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub email: Email,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
}

/// Address fields captured at checkout.
///
/// Country is not client-supplied; it comes from store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
}

impl AddressInput {
    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("line1", &self.line1),
            ("city", &self.city),
            ("region", &self.region),
            ("postal_code", &self.postal_code),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
