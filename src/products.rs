//! Products

use std::fmt;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog identifier of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u64);

impl ProductId {
    /// Wrap a raw catalog identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw catalog identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Denormalised copy of a catalog product, captured when it is added to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Catalog identifier.
    pub id: ProductId,

    /// Display name.
    pub name: String,

    /// Unit price in minor units.
    pub price: u64,

    /// Image URLs, first one is the primary image.
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductSnapshot {
    /// Create a snapshot without images.
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            images: Vec::new(),
        }
    }
}

/// Errors returned by a product catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog could not be reached or answered with an error.
    #[error("product catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the product catalog.
#[automock]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Look up a single product.
    async fn get_by_id(&self, id: ProductId) -> Result<Option<ProductSnapshot>, CatalogError>;

    /// List every product.
    async fn get_all(&self) -> Result<Vec<ProductSnapshot>, CatalogError>;
}
