//! Coupon Eligibility & Discounts

use std::sync::LazyLock;

use jiff::Timestamp;
use regex::Regex;
use rusty_money::iso::Currency;
use thiserror::Error;
use tracing::warn;

use crate::{
    pricing::{format_amount, percent_of_minor},
    services::{Coupon, CouponDiscount, CouponRecord, ServiceError},
};

#[expect(clippy::expect_used, reason = "literal pattern, exercised by the tests below")]
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("coupon code pattern"));

/// Reasons a coupon cannot be applied.
#[derive(Debug, Error)]
pub enum CouponError {
    /// The code is empty or contains characters no coupon uses.
    #[error("This promo code is not valid")]
    InvalidFormat,

    /// No active coupon has this code.
    #[error("This promo code does not exist")]
    NotFound,

    /// The validity window has not started.
    #[error("This promo code is not active yet")]
    NotYetValid,

    /// The validity window has ended.
    #[error("This promo code has expired")]
    Expired,

    /// Every redemption has been used.
    #[error("This promo code has reached its usage limit")]
    UsageLimitReached,

    /// The subtotal is below the coupon's minimum.
    #[error("A minimum order of {formatted} is required for this promo code")]
    MinimumOrderNotMet {
        /// Minimum subtotal in minor units.
        minimum: u64,

        /// Minimum formatted in the store currency.
        formatted: String,
    },

    /// The coupon store could not be queried.
    #[error("Promo codes cannot be checked right now, please try again")]
    Unavailable(#[source] ServiceError),
}

impl CouponError {
    /// Stable key for the localisation layer.
    #[must_use]
    pub const fn message_key(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "checkout.coupon.invalid_format",
            Self::NotFound => "checkout.coupon.not_found",
            Self::NotYetValid => "checkout.coupon.not_yet_valid",
            Self::Expired => "checkout.coupon.expired",
            Self::UsageLimitReached => "checkout.coupon.usage_limit",
            Self::MinimumOrderNotMet { .. } => "checkout.coupon.minimum_order",
            Self::Unavailable(_) => "checkout.coupon.unavailable",
        }
    }
}

/// Trim and upper-case `code`, rejecting anything that cannot be a coupon code.
///
/// # Errors
///
/// Returns [`CouponError::InvalidFormat`] for empty or malformed codes.
pub fn normalize_code(code: &str) -> Result<String, CouponError> {
    let code = code.trim().to_uppercase();

    if CODE_PATTERN.is_match(&code) {
        Ok(code)
    } else {
        Err(CouponError::InvalidFormat)
    }
}

/// Decide whether `record` may be redeemed at `now` against `subtotal`.
///
/// # Errors
///
/// Returns the first failing rule: validity window, usage limit, then minimum order amount.
pub fn check_eligibility(
    record: &CouponRecord,
    subtotal: u64,
    now: Timestamp,
    currency: &'static Currency,
) -> Result<(), CouponError> {
    if record.valid_from.is_some_and(|from| now < from) {
        return Err(CouponError::NotYetValid);
    }

    if record.valid_until.is_some_and(|until| now > until) {
        return Err(CouponError::Expired);
    }

    if record
        .usage_limit
        .is_some_and(|limit| record.usage_count >= limit)
    {
        return Err(CouponError::UsageLimitReached);
    }

    if let Some(minimum) = record.coupon.min_order_amount
        && subtotal < minimum
    {
        return Err(CouponError::MinimumOrderNotMet {
            minimum,
            formatted: format_amount(minimum, currency),
        });
    }

    Ok(())
}

impl Coupon {
    /// Discount on `subtotal`, capped by `max_discount_amount` and never above the subtotal.
    #[must_use]
    pub fn discount_for(&self, subtotal: u64) -> u64 {
        let computed = match self.discount {
            CouponDiscount::Fixed(amount) => amount,
            CouponDiscount::Percentage(percent) => percent_of_minor(percent, subtotal)
                .unwrap_or_else(|error| {
                    warn!(code = %self.code, "ignoring unusable coupon percentage: {error}");

                    0
                }),
        };

        let capped = self
            .max_discount_amount
            .map_or(computed, |max| computed.min(max));

        capped.min(subtotal)
    }
}
