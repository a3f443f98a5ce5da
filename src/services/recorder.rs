//! Checkout Session Recorder
//!
//! Write-only mirror of checkout progress for operational visibility. Nothing here is read back
//! and no response changes the checkout flow.

use async_trait::async_trait;
use mockall::automock;

use crate::{
    cart::CartItem,
    checkout::{CheckoutStep, PersonalInfo, ShippingInfo},
    services::ServiceError,
};

/// Best-effort mirror of checkout progress.
#[automock]
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    /// Record the personal-info step.
    async fn save_personal_info(&self, info: &PersonalInfo) -> Result<(), ServiceError>;

    /// Record the shipping step.
    async fn save_shipping_info(&self, info: &ShippingInfo) -> Result<(), ServiceError>;

    /// Record the applied coupon code, `None` when removed.
    async fn save_promo_code(&self, code: Option<String>) -> Result<(), ServiceError>;

    /// Record the cart contents at the time of the step.
    async fn save_cart_snapshot(&self, items: &[CartItem]) -> Result<(), ServiceError>;

    /// Record the step the shopper is now on.
    async fn update_step(&self, step: CheckoutStep) -> Result<(), ServiceError>;
}
