//! Remote Cart Store

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::{identity::UserId, products::ProductId, services::ServiceError};

/// A cart row as stored server-side: only the product reference and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCartLine {
    /// Product reference.
    pub product_id: ProductId,

    /// Units in the cart.
    pub quantity: u32,
}

/// Server-side source of truth for a signed-in shopper's cart.
#[automock]
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// All rows of `user`'s cart, in insertion order.
    async fn list_items(&self, user: UserId) -> Result<Vec<RemoteCartLine>, ServiceError>;

    /// Replace every row of `user`'s cart with `lines`.
    async fn replace_items(
        &self,
        user: UserId,
        lines: &[RemoteCartLine],
    ) -> Result<(), ServiceError>;
}
