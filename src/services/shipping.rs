//! Shipping Settings

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::services::ServiceError;

/// Subtotal from which shipping is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FreeShippingThreshold {
    /// Threshold in minor units.
    pub amount: u64,

    /// Whether the threshold applies at all.
    pub enabled: bool,
}

impl FreeShippingThreshold {
    /// Whether `subtotal` reaches the threshold.
    #[must_use]
    pub fn reached_by(self, subtotal: u64) -> bool {
        self.enabled && subtotal >= self.amount
    }
}

/// Read access to shipping settings.
#[automock]
#[async_trait]
pub trait ShippingSettings: Send + Sync {
    /// Current free-shipping threshold.
    async fn free_shipping_threshold(&self) -> Result<FreeShippingThreshold, ServiceError>;
}
