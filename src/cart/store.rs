//! Cart Store
//!
//! Owns the in-memory [`CartState`] and runs its persistence effects. Mutations are applied
//! synchronously through the reducer and never wait on storage; [`CartStore::flush`] writes the
//! latest state, so several quick mutations coalesce into one write.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    cache::KeyValueCache,
    cart::{
        CartAction, CartItem, CartState,
        repository::{
            CartRepository, FallbackCartRepository, LocalCartRepository, RemoteCartRepository,
        },
    },
    identity::{Identity, IdentityProvider},
    products::{ProductCatalog, ProductId, ProductSnapshot},
    services::RemoteCartStore,
};

/// Cart state plus its load/save/sign-out effects.
pub struct CartStore {
    state: CartState,
    hydrated: bool,
    dirty: bool,
    last_identity: Option<Identity>,
    identity: Arc<dyn IdentityProvider>,
    cache: Arc<dyn KeyValueCache>,
    remote: Arc<dyn RemoteCartStore>,
    catalog: Arc<dyn ProductCatalog>,
}

impl CartStore {
    /// Create an empty, not yet hydrated store.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        cache: Arc<dyn KeyValueCache>,
        remote: Arc<dyn RemoteCartStore>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self {
            state: CartState::new(),
            hydrated: false,
            dirty: false,
            last_identity: None,
            identity,
            cache,
            remote,
            catalog,
        }
    }

    /// Current cart contents.
    #[must_use]
    pub fn state(&self) -> &CartState {
        &self.state
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        self.state.items()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.state.item_count()
    }

    /// Sum of line totals, in minor units.
    #[must_use]
    pub fn total_price(&self) -> u64 {
        self.state.total_price()
    }

    /// Whether the store has been hydrated from storage.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Whether a change is waiting for [`CartStore::flush`].
    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.dirty
    }

    /// Add `quantity` units of `product`.
    pub fn add_item(&mut self, product: ProductSnapshot, quantity: u32) {
        self.dispatch(CartAction::AddItem { product, quantity });
    }

    /// Remove the line for `id`.
    pub fn remove_item(&mut self, id: ProductId) {
        self.dispatch(CartAction::RemoveItem(id));
    }

    /// Set the quantity for `id`; zero or less removes the line.
    pub fn update_item_quantity(&mut self, id: ProductId, quantity: i64) {
        self.dispatch(CartAction::UpdateQuantity { id, quantity });
    }

    /// Empty the cart.
    pub fn clear_cart(&mut self) {
        self.dispatch(CartAction::Clear);
    }

    /// Replace the whole item list.
    pub fn hydrate(&mut self, items: Vec<CartItem>) {
        self.dispatch(CartAction::Hydrate(items));
    }

    /// Apply `action`. A change is only scheduled for saving once the store has been hydrated, so
    /// the empty initial state never overwrites a stored cart.
    pub fn dispatch(&mut self, action: CartAction) {
        let next = self.state.clone().reduce(action);

        if next == self.state {
            return;
        }

        self.state = next;

        if self.hydrated {
            self.dirty = true;
        } else {
            debug!("cart changed before hydration; not scheduling a save");
        }
    }

    /// Hydrate from the repository matching the current identity.
    ///
    /// Signed-in shoppers read the remote store first and fall back to the local cache when it is
    /// empty or unreachable. Failures leave an empty cart.
    #[instrument(name = "cart.store.load", skip(self))]
    pub async fn load(&mut self) {
        let identity = self.identity.current().await;
        let repository = self.repository_for(identity);

        let items = match repository.load().await {
            Ok(items) => items.unwrap_or_default(),
            Err(error) => {
                warn!("failed to load cart, starting empty: {error}");

                Vec::new()
            }
        };

        debug!(lines = items.len(), "hydrating cart");

        self.state = CartState::new().reduce(CartAction::Hydrate(items));
        self.hydrated = true;
        self.dirty = false;
        self.last_identity = Some(identity);
    }

    /// Write the latest state if it changed since the last write.
    ///
    /// Anonymous shoppers write the local cache; signed-in shoppers write the remote store and fall
    /// back to the local cache on failure. Failures are logged and dropped.
    #[instrument(name = "cart.store.flush", skip(self), fields(lines = self.state.items().len()))]
    pub async fn flush(&mut self) {
        if !self.dirty || !self.hydrated {
            return;
        }

        self.dirty = false;

        let identity = self.identity.current().await;

        if let Err(error) = self.repository_for(identity).save(self.state.items()).await {
            warn!("failed to save cart: {error}");
        }
    }

    /// React to sign-in/sign-out since the last load.
    ///
    /// Signing out empties the cart and deletes the cached copy. Signing in reloads from the
    /// remote store; a guest cart is not merged into it.
    #[instrument(name = "cart.store.sync_identity", skip(self))]
    pub async fn sync_identity(&mut self) {
        let current = self.identity.current().await;
        let previous = self.last_identity.replace(current);

        match (previous, current) {
            (Some(Identity::SignedIn(_)), Identity::Anonymous) => {
                info!("shopper signed out; clearing cart");

                self.state = CartState::new();
                self.dirty = false;

                if let Err(error) = LocalCartRepository::new(Arc::clone(&self.cache))
                    .clear()
                    .await
                {
                    warn!("failed to delete cached cart: {error}");
                }
            }
            (Some(Identity::Anonymous) | None, Identity::SignedIn(_)) => {
                info!("shopper signed in; reloading cart");

                self.load().await;
            }
            _ => {}
        }
    }

    fn repository_for(&self, identity: Identity) -> Box<dyn CartRepository> {
        let local = LocalCartRepository::new(Arc::clone(&self.cache));

        match identity {
            Identity::Anonymous => Box::new(local),
            Identity::SignedIn(user) => Box::new(FallbackCartRepository::new(
                RemoteCartRepository::new(
                    user,
                    Arc::clone(&self.remote),
                    Arc::clone(&self.catalog),
                ),
                local,
            )),
        }
    }
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &self.state)
            .field("hydrated", &self.hydrated)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
