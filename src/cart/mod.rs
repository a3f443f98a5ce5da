//! Cart
//!
//! The cart is a list of line items changed only through [`CartAction`]s applied by the pure
//! [`CartState::reduce`] transition. Persistence lives in [`store::CartStore`], which observes
//! transitions and writes the latest state through a [`repository::CartRepository`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::products::{ProductId, ProductSnapshot};

pub mod repository;
pub mod store;

pub use repository::{
    CartRepository, FallbackCartRepository, LocalCartRepository, MockCartRepository,
    PersistenceError, RemoteCartRepository,
};
pub use store::CartStore;

/// A product in the cart with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product identifier, unique within a cart.
    pub id: ProductId,

    /// Units, always at least one.
    pub quantity: u32,

    /// Product details captured when the item was first added.
    pub product: ProductSnapshot,
}

impl CartItem {
    /// `quantity × price` in minor units.
    #[must_use]
    pub fn line_total(&self) -> u64 {
        self.product.price.saturating_mul(u64::from(self.quantity))
    }
}

/// Changes that can be applied to a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    /// Add `quantity` units of `product`, merging with an existing line.
    AddItem {
        /// Product to add.
        product: ProductSnapshot,

        /// Units to add.
        quantity: u32,
    },

    /// Remove the line for this product.
    RemoveItem(ProductId),

    /// Set the quantity of a line; zero or less removes it.
    UpdateQuantity {
        /// Line to change.
        id: ProductId,

        /// New quantity.
        quantity: i64,
    },

    /// Remove every line.
    Clear,

    /// Replace every line wholesale.
    Hydrate(Vec<CartItem>),
}

/// Canonical cart contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartState {
    items: Vec<CartItem>,
}

impl CartState {
    /// Empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of `quantity × price`, in minor units.
    #[must_use]
    pub fn total_price(&self) -> u64 {
        self.items
            .iter()
            .fold(0_u64, |total, item| total.saturating_add(item.line_total()))
    }

    /// Look up the line for `id`.
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Apply `action` and return the resulting state.
    #[must_use]
    pub fn reduce(mut self, action: CartAction) -> Self {
        match action {
            CartAction::AddItem { quantity: 0, .. } => {}
            CartAction::AddItem { product, quantity } => {
                if let Some(existing) = self.items.iter_mut().find(|item| item.id == product.id) {
                    existing.quantity = existing.quantity.saturating_add(quantity);
                } else {
                    self.items.push(CartItem {
                        id: product.id,
                        quantity,
                        product,
                    });
                }
            }
            CartAction::RemoveItem(id) => self.items.retain(|item| item.id != id),
            CartAction::UpdateQuantity { id, quantity } => {
                if quantity <= 0 {
                    self.items.retain(|item| item.id != id);
                } else if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
                    item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
                }
            }
            CartAction::Clear => self.items.clear(),
            CartAction::Hydrate(items) => self.items = normalize_items(items),
        }

        self
    }
}

/// Enforce the cart invariants on untrusted input: no zero quantities, no duplicate ids. The first
/// occurrence of a duplicated id keeps its position and absorbs later quantities.
pub(crate) fn normalize_items(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut normalized: Vec<CartItem> = Vec::with_capacity(items.len());

    for item in items {
        if item.quantity == 0 || item.id != item.product.id {
            debug!(product_id = %item.id, "dropping invalid cart line");
            continue;
        }

        match normalized.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => normalized.push(item),
        }
    }

    normalized
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CachedCart {
    Wrapped { items: Vec<CartItem> },
    Bare(Vec<CartItem>),
}

/// Parse a cached cart blob, accepting both `{"items": [...]}` and a bare array.
///
/// Returns `None` for anything else; malformed content is discarded, never fatal.
#[must_use]
pub fn parse_cached_items(value: Value) -> Option<Vec<CartItem>> {
    match serde_json::from_value::<CachedCart>(value) {
        Ok(CachedCart::Wrapped { items } | CachedCart::Bare(items)) => {
            Some(normalize_items(items))
        }
        Err(error) => {
            debug!("discarding unreadable cached cart: {error}");

            None
        }
    }
}
