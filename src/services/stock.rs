//! Stock Service

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::{products::ProductId, services::ServiceError};

/// Units of a product to reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    /// Product to reserve.
    pub product_id: ProductId,

    /// Requested units.
    pub quantity: u32,
}

/// Why a single line could not be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFailure {
    /// Product that failed.
    pub product_id: ProductId,

    /// Reason given by the stock service, shown to the shopper verbatim.
    pub error: String,
}

/// Answer of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReservationOutcome {
    /// True only when every line could be reserved.
    pub success: bool,

    /// Per-line failures.
    #[serde(default)]
    pub errors: Vec<ReservationFailure>,
}

/// Answers whether requested quantities are currently orderable.
#[automock]
#[async_trait]
pub trait StockService: Send + Sync {
    /// Check/hold every line in `lines`.
    async fn reserve(&self, lines: &[ReservationLine]) -> Result<ReservationOutcome, ServiceError>;
}
