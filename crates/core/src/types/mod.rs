//! Core types for Aurora.
//!
//! This module provides type-safe wrappers for common domain concepts.

#[macro_use]
mod text_enum;

pub mod email;
pub mod id;
pub mod money;
pub mod plan;
pub mod quantity;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CountryCode, CurrencyCode, MoneyError, line_total, round_money, validate_amount};
pub use plan::{EntitlementStatus, PlanInterval, ProPlan, entitlement_status, is_entitled};
pub use quantity::{Quantity, QuantityError, QuantityUpdate};
pub use status::*;
pub use text_enum::UnknownVariant;
