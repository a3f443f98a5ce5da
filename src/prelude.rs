//! Storefront prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cache::{CacheError, FileCache, KeyValueCache, MemoryCache, ScopedCache},
    cart::{CartAction, CartItem, CartState, store::CartStore},
    checkout::{
        AdvanceError, CheckoutDraft, CheckoutFormData, CheckoutMachine, CheckoutStep, CouponError,
        FieldErrors, OrderSummary, PersonalInfo, ShippingInfo,
    },
    config::{CheckoutConfig, ConfigError},
    context::{Frontend, StorefrontContext},
    fixtures::{Fixture, FixtureError},
    http::{HttpError, backend::RestBackend, gateway::HttpPaymentGateway},
    identity::{Identity, IdentityProvider, SharedIdentity, UserId},
    notify::{Notifier, Toast, ToastLevel, ToastLog},
    payment::{
        NavigationTarget, Navigator, OrderBounds, PaymentError, PaymentHandshake,
        PaymentLifecycle, PaymentRedirect, RecordingNavigator,
    },
    products::{CatalogError, ProductCatalog, ProductId, ProductSnapshot},
    services::{PaymentMethod, ServiceError},
};
