//! Aurora Pro plans and entitlement arithmetic.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::text_enum::UnknownVariant;

text_enum! {
    /// Billing interval of a plan.
    pub enum PlanInterval {
        Month => "month",
        Year => "year",
    }
}

text_enum! {
    /// Display status derived from entitlement and the provider's renewal flag.
    pub enum EntitlementStatus {
        Active => "active",
        Canceling => "canceling",
        Expired => "expired",
    }
}

/// Derive the display status of a subscription.
///
/// Not entitled wins over everything; an entitled subscription whose renewal
/// is suppressed shows as canceling.
#[must_use]
pub const fn entitlement_status(entitled: bool, cancel_at_period_end: bool) -> EntitlementStatus {
    match (entitled, cancel_at_period_end) {
        (false, _) => EntitlementStatus::Expired,
        (true, true) => EntitlementStatus::Canceling,
        (true, false) => EntitlementStatus::Active,
    }
}

/// Whether a user is entitled at `now`.
///
/// An unknown expiry is treated as not entitled.
#[must_use]
pub fn is_entitled(is_pro: bool, pro_valid: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_pro && pro_valid.is_some_and(|valid| valid > now)
}

/// The Aurora Pro plan a user is on.
///
/// Stored in `users.pro_plan` as `M`/`A`; exchanged over JSON as
/// `monthly`/`annual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProPlan {
    Monthly,
    Annual,
}

impl ProPlan {
    /// Length of the entitlement granted by one activation.
    #[must_use]
    pub fn entitlement(self) -> Duration {
        match self {
            Self::Monthly => Duration::days(30),
            Self::Annual => Duration::days(365),
        }
    }

    /// Expiry of an entitlement activated at `now`.
    #[must_use]
    pub fn entitlement_end(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.entitlement()
    }

    /// Start of the billing period ending at `period_end`, one interval back.
    ///
    /// Used for display only.
    #[must_use]
    pub fn period_start(self, period_end: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            Self::Monthly => Months::new(1),
            Self::Annual => Months::new(12),
        };
        period_end
            .checked_sub_months(months)
            .unwrap_or(period_end - self.entitlement())
    }

    /// Billing interval of this plan.
    #[must_use]
    pub const fn interval(self) -> PlanInterval {
        match self {
            Self::Monthly => PlanInterval::Month,
            Self::Annual => PlanInterval::Year,
        }
    }

    /// Code of the `plans` row backing this plan.
    #[must_use]
    pub const fn plan_code(self) -> &'static str {
        match self {
            Self::Monthly => "aurora_pro_monthly",
            Self::Annual => "aurora_pro_annual",
        }
    }

    /// Wire name (`monthly` / `annual`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    /// Column value in `users.pro_plan` (`M` / `A`).
    #[must_use]
    pub const fn db_code(self) -> &'static str {
        match self {
            Self::Monthly => "M",
            Self::Annual => "A",
        }
    }

    /// Parse either the wire name or the column value, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownVariant`] for anything else.
    pub fn parse(value: &str) -> Result<Self, UnknownVariant> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" | "m" => Ok(Self::Monthly),
            "annual" | "a" => Ok(Self::Annual),
            _ => Err(UnknownVariant {
                kind: "ProPlan",
                value: value.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for ProPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProPlan {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ProPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ProPlan {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ProPlan {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ProPlan {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.db_code(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_entitlement_end_is_exact() {
        let now = at(2024, 1, 31);
        assert_eq!(ProPlan::Monthly.entitlement_end(now), now + Duration::days(30));
        assert_eq!(ProPlan::Annual.entitlement_end(now), now + Duration::days(365));
    }

    #[test]
    fn test_period_start_subtracts_one_interval() {
        assert_eq!(ProPlan::Monthly.period_start(at(2024, 3, 15)), at(2024, 2, 15));
        assert_eq!(ProPlan::Annual.period_start(at(2025, 6, 1)), at(2024, 6, 1));
        // Month-end clamps to the shorter month
        assert_eq!(ProPlan::Monthly.period_start(at(2024, 3, 31)), at(2024, 2, 29));
    }

    #[test]
    fn test_parse_accepts_wire_and_column_forms() {
        assert_eq!(ProPlan::parse("monthly").unwrap(), ProPlan::Monthly);
        assert_eq!(ProPlan::parse("A").unwrap(), ProPlan::Annual);
        assert_eq!(ProPlan::parse(" Annual ").unwrap(), ProPlan::Annual);
        assert!(ProPlan::parse("weekly").is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&ProPlan::Annual).unwrap(), "\"annual\"");
        let plan: ProPlan = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(plan, ProPlan::Monthly);
    }

    #[test]
    fn test_entitlement_status_derivation() {
        assert_eq!(entitlement_status(false, false), EntitlementStatus::Expired);
        assert_eq!(entitlement_status(false, true), EntitlementStatus::Expired);
        assert_eq!(entitlement_status(true, true), EntitlementStatus::Canceling);
        assert_eq!(entitlement_status(true, false), EntitlementStatus::Active);
    }

    #[test]
    fn test_unknown_expiry_is_not_entitled() {
        let now = at(2024, 6, 1);
        assert!(!is_entitled(true, None, now));
        assert!(!is_entitled(true, Some(at(2024, 1, 1)), now));
        assert!(!is_entitled(false, Some(at(2025, 1, 1)), now));
        assert!(is_entitled(true, Some(at(2025, 1, 1)), now));
    }
}
