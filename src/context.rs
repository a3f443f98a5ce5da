//! Storefront Context

use std::sync::Arc;

use crate::{
    cache::{KeyValueCache, ScopedCache},
    cart::CartStore,
    checkout::CheckoutMachine,
    config::{CheckoutConfig, ConfigError},
    identity::IdentityProvider,
    notify::Notifier,
    payment::{Navigator, PaymentHandshake},
    products::ProductCatalog,
    services::{
        AntiForgeryTokens, CouponStore, PaymentSessionEndpoint, RemoteCartStore, SessionRecorder,
        ShippingSettings, StockService,
    },
};

/// Client-side collaborators: who is shopping, where state is kept, and how the shopper is shown
/// things.
#[derive(Clone)]
pub struct Frontend {
    /// Current identity.
    pub identity: Arc<dyn IdentityProvider>,

    /// Persistent key-value cache, before namespacing.
    pub cache: Arc<dyn KeyValueCache>,

    /// Browsing context.
    pub navigator: Arc<dyn Navigator>,

    /// Toast surface.
    pub notifier: Arc<dyn Notifier>,
}

/// Every collaborator the cart and checkout need.
#[derive(Clone)]
pub struct StorefrontContext {
    /// Current identity.
    pub identity: Arc<dyn IdentityProvider>,

    /// Namespaced persistent cache.
    pub cache: Arc<dyn KeyValueCache>,

    /// Product catalog.
    pub catalog: Arc<dyn ProductCatalog>,

    /// Remote cart store for signed-in shoppers.
    pub remote_carts: Arc<dyn RemoteCartStore>,

    /// Coupon store.
    pub coupons: Arc<dyn CouponStore>,

    /// Stock reservations.
    pub stock: Arc<dyn StockService>,

    /// Shipping settings.
    pub shipping: Arc<dyn ShippingSettings>,

    /// Checkout session recorder.
    pub recorder: Arc<dyn SessionRecorder>,

    /// Payment session endpoint.
    pub payments: Arc<dyn PaymentSessionEndpoint>,

    /// Anti-forgery tokens.
    pub tokens: Arc<dyn AntiForgeryTokens>,

    /// Browsing context.
    pub navigator: Arc<dyn Navigator>,

    /// Toast surface.
    pub notifier: Arc<dyn Notifier>,
}

impl StorefrontContext {
    /// Build a context from one backend serving the storefront contracts and one gateway serving
    /// the payment contracts. Cache keys are prefixed with the configured namespace.
    pub fn from_backend<B, G>(
        config: &CheckoutConfig,
        backend: Arc<B>,
        gateway: Arc<G>,
        frontend: Frontend,
    ) -> Self
    where
        B: RemoteCartStore
            + ProductCatalog
            + CouponStore
            + StockService
            + ShippingSettings
            + SessionRecorder
            + 'static,
        G: PaymentSessionEndpoint + AntiForgeryTokens + 'static,
    {
        Self {
            identity: frontend.identity,
            cache: Arc::new(ScopedCache::new(
                config.cache_namespace.clone(),
                frontend.cache,
            )),
            catalog: backend.clone(),
            remote_carts: backend.clone(),
            coupons: backend.clone(),
            stock: backend.clone(),
            shipping: backend.clone(),
            recorder: backend,
            payments: gateway.clone(),
            tokens: gateway,
            navigator: frontend.navigator,
            notifier: frontend.notifier,
        }
    }

    /// A cart store backed by this context.
    #[must_use]
    pub fn cart_store(&self) -> CartStore {
        CartStore::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.cache),
            Arc::clone(&self.remote_carts),
            Arc::clone(&self.catalog),
        )
    }

    /// A checkout wizard backed by this context.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` is invalid.
    pub fn checkout_machine(&self, config: &CheckoutConfig) -> Result<CheckoutMachine, ConfigError> {
        CheckoutMachine::new(
            config,
            Arc::clone(&self.cache),
            Arc::clone(&self.recorder),
            Arc::clone(&self.coupons),
            Arc::clone(&self.notifier),
        )
    }

    /// A payment handshake backed by this context.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` is invalid.
    pub fn payment_handshake(
        &self,
        config: &CheckoutConfig,
    ) -> Result<PaymentHandshake, ConfigError> {
        PaymentHandshake::new(config, self)
    }
}
