//! Pricing

use decimal_percentage::Percentage;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

/// Errors specific to amount calculations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    /// Percentage calculation could not be safely converted.
    #[error("percentage conversion overflowed or was not finite")]
    PercentConversion,

    /// Percentage points outside 0 to 100.
    #[error("percentage must be between 0 and 100, got {0}")]
    PercentOutOfRange(Decimal),
}

/// Build a percentage from percentage points, e.g. `10` for 10%.
///
/// # Errors
///
/// Returns [`PricingError::PercentOutOfRange`] unless `points` lies within 0 to 100.
pub fn percent_from_points(points: Decimal) -> Result<Percentage, PricingError> {
    if points < Decimal::ZERO || points > Decimal::ONE_HUNDRED {
        return Err(PricingError::PercentOutOfRange(points));
    }

    Ok(Percentage::from(points / Decimal::ONE_HUNDRED))
}

/// Percentage points of `percent`, e.g. `10` for 10%.
#[must_use]
pub fn percent_points(percent: Percentage) -> Decimal {
    percent * Decimal::ONE_HUNDRED
}

/// Calculate `percent` of `minor`, rounded half away from zero to a whole minor unit.
///
/// # Errors
///
/// Returns [`PricingError::PercentConversion`] if the result is negative or overflows.
pub fn percent_of_minor(percent: Percentage, minor: u64) -> Result<u64, PricingError> {
    (percent * Decimal::ONE)
        .checked_mul(Decimal::from(minor))
        .ok_or(PricingError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or(PricingError::PercentConversion)
}

/// Serde adapter storing a [`Percentage`] as its percentage points.
pub mod points_serde {
    use decimal_percentage::Percentage;
    use rust_decimal::{
        Decimal,
        prelude::{FromPrimitive, ToPrimitive},
    };
    use serde::{Deserialize, Deserializer, Serializer, de, ser};

    use super::{PricingError, percent_from_points, percent_points};

    /// Write `percent` as a number of percentage points.
    ///
    /// # Errors
    ///
    /// Fails when the points cannot be represented as a float.
    pub fn serialize<S: Serializer>(percent: &Percentage, serializer: S) -> Result<S::Ok, S::Error> {
        let points = percent_points(*percent)
            .to_f64()
            .ok_or_else(|| <S::Error as ser::Error>::custom(PricingError::PercentConversion))?;

        serializer.serialize_f64(points)
    }

    /// Read a number of percentage points.
    ///
    /// # Errors
    ///
    /// Fails on non-finite numbers and on points outside 0 to 100.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Percentage, D::Error> {
        let points = f64::deserialize(deserializer)?;

        Decimal::from_f64(points)
            .ok_or(PricingError::PercentConversion)
            .and_then(percent_from_points)
            .map_err(de::Error::custom)
    }
}

/// Format a minor-unit amount in `currency` for display in messages.
#[must_use]
pub fn format_amount(minor: u64, currency: &'static Currency) -> String {
    let minor = i64::try_from(minor).unwrap_or(i64::MAX);

    Money::from_minor(minor, currency).to_string()
}

/// Convert a whole-unit value (as stored by the backend, e.g. `49.90`) into minor units.
#[must_use]
pub fn major_to_minor(major: f64, currency: &'static Currency) -> Option<u64> {
    let major = Decimal::from_f64(major)?;
    let scale = Decimal::from(10_u64.checked_pow(currency.exponent)?);

    major
        .checked_mul(scale)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
}
