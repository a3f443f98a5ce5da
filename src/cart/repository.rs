//! Cart Repositories
//!
//! One interface over the two places a cart can live: the device-local cache for anonymous
//! shoppers and the remote cart store for signed-in shoppers.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cache::{CART_KEY, CacheError, KeyValueCache},
    cart::{CartItem, normalize_items, parse_cached_items},
    identity::UserId,
    products::{CatalogError, ProductCatalog},
    services::{RemoteCartLine, RemoteCartStore, ServiceError},
};

/// Cart persistence failures. These never leave the cart store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Local cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Remote cart store failure.
    #[error(transparent)]
    Remote(#[from] ServiceError),

    /// Product catalog failure while resolving remote rows.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Items could not be encoded.
    #[error("failed to encode cart")]
    Encode(#[from] serde_json::Error),
}

/// Where a cart is loaded from and saved to.
#[automock]
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Stored items, `None` when nothing usable is stored.
    async fn load(&self) -> Result<Option<Vec<CartItem>>, PersistenceError>;

    /// Replace the stored items with `items`.
    async fn save(&self, items: &[CartItem]) -> Result<(), PersistenceError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Cart stored in the device-local cache.
#[derive(Clone)]
pub struct LocalCartRepository {
    cache: Arc<dyn KeyValueCache>,
}

impl LocalCartRepository {
    /// Store the cart in `cache`.
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache }
    }

    /// Delete the cached cart.
    ///
    /// # Errors
    ///
    /// Returns an error when the cache cannot be written.
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        Ok(self.cache.remove(CART_KEY).await?)
    }
}

impl std::fmt::Debug for LocalCartRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCartRepository").finish_non_exhaustive()
    }
}

#[async_trait]
impl CartRepository for LocalCartRepository {
    async fn load(&self) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        Ok(self
            .cache
            .get(CART_KEY)
            .await?
            .and_then(parse_cached_items))
    }

    async fn save(&self, items: &[CartItem]) -> Result<(), PersistenceError> {
        self.cache
            .set(CART_KEY, json!({ "items": serde_json::to_value(items)? }))
            .await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Cart stored server-side for a signed-in shopper.
///
/// Remote rows only carry product references; loading resolves them against the catalog so the
/// snapshots reflect current catalog data.
#[derive(Clone)]
pub struct RemoteCartRepository {
    user: UserId,
    store: Arc<dyn RemoteCartStore>,
    catalog: Arc<dyn ProductCatalog>,
}

impl RemoteCartRepository {
    /// Cart of `user` in `store`, resolved against `catalog`.
    pub fn new(
        user: UserId,
        store: Arc<dyn RemoteCartStore>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self {
            user,
            store,
            catalog,
        }
    }
}

impl std::fmt::Debug for RemoteCartRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCartRepository")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CartRepository for RemoteCartRepository {
    async fn load(&self) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        let lines = self.store.list_items(self.user).await?;

        if lines.is_empty() {
            return Ok(None);
        }

        let products: FxHashMap<_, _> = self
            .catalog
            .get_all()
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let items = lines
            .into_iter()
            .filter_map(|line| {
                let Some(product) = products.get(&line.product_id) else {
                    warn!(product_id = %line.product_id, "remote cart references unknown product");

                    return None;
                };

                Some(CartItem {
                    id: line.product_id,
                    quantity: line.quantity,
                    product: product.clone(),
                })
            })
            .collect();

        let items = normalize_items(items);

        Ok((!items.is_empty()).then_some(items))
    }

    async fn save(&self, items: &[CartItem]) -> Result<(), PersistenceError> {
        let lines: Vec<_> = items
            .iter()
            .map(|item| RemoteCartLine {
                product_id: item.id,
                quantity: item.quantity,
            })
            .collect();

        self.store.replace_items(self.user, &lines).await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Tries `primary` first and falls back to `fallback`.
///
/// Loads fall through when the primary is empty or fails; saves fall through when the primary
/// fails, so a cart is never silently lost.
#[derive(Debug, Clone)]
pub struct FallbackCartRepository<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackCartRepository<P, F> {
    /// Wrap `primary` with `fallback`.
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> CartRepository for FallbackCartRepository<P, F>
where
    P: CartRepository,
    F: CartRepository,
{
    async fn load(&self) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        match self.primary.load().await {
            Ok(Some(items)) => {
                debug!(source = self.primary.name(), "loaded cart");

                return Ok(Some(items));
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    source = self.primary.name(),
                    "failed to load cart, falling back: {error}"
                );
            }
        }

        let items = self.fallback.load().await?;

        if items.is_some() {
            debug!(source = self.fallback.name(), "loaded cart");
        }

        Ok(items)
    }

    async fn save(&self, items: &[CartItem]) -> Result<(), PersistenceError> {
        let Err(error) = self.primary.save(items).await else {
            return Ok(());
        };

        warn!(
            source = self.primary.name(),
            "failed to save cart, falling back: {error}"
        );

        self.fallback.save(items).await
    }

    fn name(&self) -> &'static str {
        self.primary.name()
    }
}
