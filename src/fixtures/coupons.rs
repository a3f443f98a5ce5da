//! Coupon Fixtures

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::iso::Currency;
use serde::Deserialize;

use crate::{
    fixtures::{FixtureError, products::parse_price_in},
    pricing::percent_from_points,
    services::{Coupon, CouponDiscount, CouponRecord},
};

/// Coupon Fixture
#[derive(Debug, Deserialize)]
pub struct CouponFixture {
    /// Percentage off (e.g., "10%")
    #[serde(default)]
    pub percentage: Option<String>,

    /// Amount off (e.g., "5.00 EUR")
    #[serde(default)]
    pub fixed: Option<String>,

    /// Minimum subtotal (e.g., "50.00 EUR")
    #[serde(default)]
    pub min_order: Option<String>,

    /// Discount cap (e.g., "5.00 EUR")
    #[serde(default)]
    pub max_discount: Option<String>,

    /// Whether the coupon waives shipping
    #[serde(default)]
    pub free_shipping: bool,

    /// Start of the validity window
    #[serde(default)]
    pub valid_from: Option<Timestamp>,

    /// End of the validity window
    #[serde(default)]
    pub valid_until: Option<Timestamp>,

    /// Redemptions so far
    #[serde(default)]
    pub usage_count: u32,

    /// Maximum redemptions
    #[serde(default)]
    pub usage_limit: Option<u32>,

    /// Inactive coupons are never found
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl CouponFixture {
    /// Build the coupon record for `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if amounts are malformed, or if the coupon neither discounts nor waives
    /// shipping, or does both a percentage and a fixed amount.
    pub fn into_record(
        self,
        code: String,
        currency: &'static Currency,
    ) -> Result<CouponRecord, FixtureError> {
        let discount = match (&self.percentage, &self.fixed) {
            (Some(percentage), None) => CouponDiscount::Percentage(parse_percentage(percentage)?),
            (None, Some(fixed)) => CouponDiscount::Fixed(parse_price_in(fixed, currency)?),
            (None, None) if self.free_shipping => CouponDiscount::Fixed(0),
            _ => {
                return Err(FixtureError::InvalidCoupon(format!(
                    "{code}: expected exactly one of `percentage` or `fixed`"
                )));
            }
        };

        let amount = |value: Option<&String>| {
            value
                .map(|value| parse_price_in(value, currency))
                .transpose()
        };

        Ok(CouponRecord {
            coupon: Coupon {
                min_order_amount: amount(self.min_order.as_ref())?,
                max_discount_amount: amount(self.max_discount.as_ref())?,
                code,
                discount,
                includes_free_shipping: self.free_shipping,
            },
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            usage_count: self.usage_count,
            usage_limit: self.usage_limit,
        })
    }
}

/// Parse percentage string (e.g., "10%" or "0.10") into a `Percentage`
///
/// Accepts two formats:
/// - Percentage format: "10%" for 10%
/// - Decimal format: "0.10" for 10%
///
/// # Errors
///
/// Returns an error if the string is not a number or lies outside 0% to 100%.
pub fn parse_percentage(s: &str) -> Result<Percentage, FixtureError> {
    let trimmed = s.trim();

    let points = if let Some(percent_str) = trimmed.strip_suffix('%') {
        percent_str.trim().parse::<Decimal>().ok()
    } else {
        trimmed
            .parse::<Decimal>()
            .ok()
            .and_then(|fraction| fraction.checked_mul(Decimal::ONE_HUNDRED))
    };

    points
        .and_then(|points| percent_from_points(points).ok())
        .ok_or_else(|| FixtureError::InvalidPercentage(s.to_string()))
}
