//! Money amounts and ISO codes.
//!
//! Amounts are `rust_decimal::Decimal` in the currency's major unit (dollars,
//! not cents), stored as `NUMERIC(12, 2)`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

use super::Quantity;

/// Errors that can occur when validating money values and codes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// Amount has more than two decimal places.
    #[error("amount must have at most two decimal places")]
    TooPrecise,
    /// Code is not the expected number of ASCII letters.
    #[error("invalid {kind} code: {value:?}")]
    InvalidCode {
        /// `currency` or `country`.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

/// Round an amount to cents, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Total for a line: `unit_price * quantity`, rounded to cents.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: Quantity) -> Decimal {
    round_money(unit_price * Decimal::from(quantity.get()))
}

/// Validate a client-supplied amount.
///
/// # Errors
///
/// Returns `Negative` or `TooPrecise`.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative);
    }
    if amount.normalize().scale() > 2 {
        return Err(MoneyError::TooPrecise);
    }
    Ok(amount)
}

fn parse_code(value: &str, len: usize, kind: &'static str) -> Result<String, MoneyError> {
    let trimmed = value.trim();
    if trimmed.len() == len && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(MoneyError::InvalidCode {
            kind,
            value: value.to_owned(),
        })
    }
}

/// ISO 4217 currency code (e.g. `USD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a three-letter code, uppercasing it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCode` unless the input is exactly three ASCII letters.
    pub fn parse(value: &str) -> Result<Self, MoneyError> {
        parse_code(value, 3, "currency").map(Self)
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self("USD".to_owned())
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// ISO 3166-1 alpha-2 country code (e.g. `US`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    /// Parse a two-letter code, uppercasing it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCode` unless the input is exactly two ASCII letters.
    pub fn parse(value: &str) -> Result<Self, MoneyError> {
        parse_code(value, 2, "country").map(Self)
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CountryCode {
    fn default() -> Self {
        Self("US".to_owned())
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_line_total() {
        let qty = Quantity::new(2).unwrap();
        assert_eq!(line_total(dec("15.00"), qty), dec("30.00"));
        assert_eq!(line_total(dec("19.995"), Quantity::new(1).unwrap()), dec("20.00"));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(dec("54.99")).is_ok());
        assert!(validate_amount(Decimal::ZERO).is_ok());
        assert!(validate_amount(dec("54.990")).is_ok());
        assert_eq!(validate_amount(dec("-1")), Err(MoneyError::Negative));
        assert_eq!(validate_amount(dec("1.005")), Err(MoneyError::TooPrecise));
    }

    #[test]
    fn test_currency_code() {
        assert_eq!(CurrencyCode::parse("usd").unwrap().as_str(), "USD");
        assert!(CurrencyCode::parse("US").is_err());
        assert!(CurrencyCode::parse("U$D").is_err());
        assert_eq!(CurrencyCode::default().as_str(), "USD");
    }

    #[test]
    fn test_country_code() {
        assert_eq!(CountryCode::parse(" us ").unwrap().as_str(), "US");
        assert!(CountryCode::parse("USA").is_err());
    }
}
