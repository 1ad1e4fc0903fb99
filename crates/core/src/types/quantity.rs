//! Line-item quantities.
//!
//! JSON clients send quantities as numbers, so parsing starts from `f64` and
//! rejects anything that is not a finite whole number in range.

use serde::Serialize;

/// Errors that can occur when parsing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum QuantityError {
    /// NaN or infinite input.
    #[error("quantity must be a finite number")]
    NotFinite,
    /// Zero or negative input where a positive quantity is required.
    #[error("quantity must be positive")]
    NotPositive,
    /// Input has a fractional part.
    #[error("quantity must be a whole number")]
    Fractional,
    /// Input exceeds the per-request ceiling.
    #[error("quantity must be at most {max}")]
    TooLarge {
        /// Largest accepted value.
        max: i32,
    },
}

/// A strictly positive whole-number quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Quantity(i32);

impl Quantity {
    /// Largest quantity accepted in a single request.
    pub const MAX: i32 = 9_999;

    /// Create a quantity from an integer.
    ///
    /// # Errors
    ///
    /// Returns `NotPositive` for values `<= 0` and `TooLarge` above [`Self::MAX`].
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value <= 0 {
            return Err(QuantityError::NotPositive);
        }
        i32::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(QuantityError::TooLarge { max: Self::MAX })
    }

    /// Create a quantity from a JSON number.
    ///
    /// # Errors
    ///
    /// Returns an error unless `value` is a finite, positive whole number no
    /// larger than [`Self::MAX`].
    pub fn from_f64(value: f64) -> Result<Self, QuantityError> {
        if !value.is_finite() {
            return Err(QuantityError::NotFinite);
        }
        if value <= 0.0 {
            return Err(QuantityError::NotPositive);
        }
        if value.fract() != 0.0 {
            return Err(QuantityError::Fractional);
        }
        if value > f64::from(Self::MAX) {
            return Err(QuantityError::TooLarge { max: Self::MAX });
        }
        #[allow(clippy::cast_possible_truncation)] // range checked above
        Ok(Self(value as i32))
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a "set quantity" request.
///
/// Zero or negative input means "remove the line".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityUpdate {
    /// Delete the line item.
    Remove,
    /// Replace the line item's quantity.
    Set(Quantity),
}

impl QuantityUpdate {
    /// Interpret a JSON number as a quantity update.
    ///
    /// # Errors
    ///
    /// Returns `NotFinite` for NaN/infinity, and the [`Quantity::from_f64`]
    /// errors for positive inputs.
    pub fn from_f64(value: f64) -> Result<Self, QuantityError> {
        if !value.is_finite() {
            return Err(QuantityError::NotFinite);
        }
        if value <= 0.0 {
            return Ok(Self::Remove);
        }
        Quantity::from_f64(value).map(Self::Set)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f64_accepts_whole_numbers() {
        assert_eq!(Quantity::from_f64(2.0).unwrap().get(), 2);
        assert_eq!(Quantity::from_f64(9_999.0).unwrap().get(), 9_999);
    }

    #[test]
    fn test_from_f64_rejects_invalid() {
        assert_eq!(Quantity::from_f64(0.0), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::from_f64(-3.0), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::from_f64(1.5), Err(QuantityError::Fractional));
        assert_eq!(Quantity::from_f64(f64::NAN), Err(QuantityError::NotFinite));
        assert_eq!(
            Quantity::from_f64(f64::INFINITY),
            Err(QuantityError::NotFinite)
        );
        assert_eq!(
            Quantity::from_f64(10_000.0),
            Err(QuantityError::TooLarge { max: 9_999 })
        );
    }

    #[test]
    fn test_new_bounds() {
        assert!(Quantity::new(1).is_ok());
        assert_eq!(Quantity::new(0), Err(QuantityError::NotPositive));
        assert!(Quantity::new(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn test_update_zero_or_negative_removes() {
        assert_eq!(QuantityUpdate::from_f64(0.0).unwrap(), QuantityUpdate::Remove);
        assert_eq!(QuantityUpdate::from_f64(-4.0).unwrap(), QuantityUpdate::Remove);
    }

    #[test]
    fn test_update_positive_sets() {
        assert_eq!(
            QuantityUpdate::from_f64(3.0).unwrap(),
            QuantityUpdate::Set(Quantity::new(3).unwrap())
        );
        assert!(QuantityUpdate::from_f64(2.5).is_err());
        assert!(QuantityUpdate::from_f64(f64::NAN).is_err());
    }
}
