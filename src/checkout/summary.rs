//! Order Summary

use serde::Serialize;

use crate::services::{Coupon, FreeShippingThreshold};

/// Amounts shown on the payment step. Recomputed from its inputs every time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    /// Sum of line totals.
    pub subtotal: u64,

    /// Coupon discount.
    pub discount: u64,

    /// Whether shipping is waived.
    pub free_shipping: bool,

    /// Shipping charged.
    pub shipping: u64,

    /// Amount to pay.
    pub total: u64,
}

impl OrderSummary {
    /// Compute the summary for `subtotal` with an optional coupon.
    ///
    /// Shipping is free when the subtotal reaches an enabled threshold or the coupon waives it;
    /// otherwise `flat_shipping_rate` is charged.
    #[must_use]
    pub fn compute(
        subtotal: u64,
        coupon: Option<&Coupon>,
        threshold: FreeShippingThreshold,
        flat_shipping_rate: u64,
    ) -> Self {
        let discount = coupon.map_or(0, |coupon| coupon.discount_for(subtotal));

        let free_shipping = threshold.reached_by(subtotal)
            || coupon.is_some_and(|coupon| coupon.includes_free_shipping);

        let shipping = if free_shipping { 0 } else { flat_shipping_rate };

        Self {
            subtotal,
            discount,
            free_shipping,
            shipping,
            total: subtotal.saturating_sub(discount).saturating_add(shipping),
        }
    }
}
