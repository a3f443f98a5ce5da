//! Coupon Store

use async_trait::async_trait;
use decimal_percentage::Percentage;
use jiff::Timestamp;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::{pricing::points_serde, services::ServiceError};

/// How a coupon reduces the order subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CouponDiscount {
    /// Share of the subtotal, stored as percentage points.
    Percentage(#[serde(with = "points_serde")] Percentage),

    /// Fixed amount in minor units.
    Fixed(u64),
}

/// A coupon that can be applied to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Normalised (upper-case) code.
    pub code: String,

    /// Discount rule.
    pub discount: CouponDiscount,

    /// Minimum subtotal (minor units) for the coupon to be accepted.
    #[serde(default)]
    pub min_order_amount: Option<u64>,

    /// Upper bound of the discount (minor units).
    #[serde(default)]
    pub max_discount_amount: Option<u64>,

    /// Whether the coupon also waives shipping.
    #[serde(default)]
    pub includes_free_shipping: bool,
}

/// A coupon together with the bookkeeping needed to decide whether it may be redeemed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponRecord {
    /// The redeemable coupon.
    pub coupon: Coupon,

    /// Start of the validity window.
    #[serde(default)]
    pub valid_from: Option<Timestamp>,

    /// End of the validity window.
    #[serde(default)]
    pub valid_until: Option<Timestamp>,

    /// Number of redemptions so far.
    #[serde(default)]
    pub usage_count: u32,

    /// Maximum number of redemptions, unlimited when absent.
    #[serde(default)]
    pub usage_limit: Option<u32>,
}

/// Read access to active coupons.
#[automock]
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Find the active coupon with exactly this (normalised) code.
    async fn find_active_by_code(&self, code: &str) -> Result<Option<CouponRecord>, ServiceError>;
}
