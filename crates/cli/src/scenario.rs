//! Checkout scenarios
//!
//! A scenario names a fixture, the cart actions a shopper takes, what they type into the checkout
//! form, an optional coupon and the payment method. Running it drives the library exactly as the
//! storefront pages would.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use rusty_money::iso::{self, Currency};
use serde::Deserialize;
use storefront::{
    cache::{FileCache, KeyValueCache, MemoryCache},
    cart::{CartItem, CartStore},
    checkout::{AdvanceError, CheckoutDraft, CheckoutStep, OrderSummary},
    config::{CheckoutConfig, ConfigError},
    context::{Frontend, StorefrontContext},
    fixtures::{Fixture, FixtureError},
    http::{HttpPaymentGateway, RestBackend},
    identity::{Identity, SharedIdentity, UserId},
    notify::{Toast, ToastLog},
    payment::{PaymentError, PaymentRedirect, RecordingNavigator},
    products::{CatalogError, ProductId},
    services::PaymentMethod,
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BackendConfig;

/// Errors that stop a scenario before it reaches a verdict.
#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    /// Scenario file could not be read.
    #[error("failed to read scenario: {0}")]
    Io(#[from] io::Error),

    /// Scenario file is not valid YAML.
    #[error("failed to parse scenario: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Fixture could not be loaded.
    #[error("failed to load fixture: {0}")]
    Fixture(#[from] FixtureError),

    /// Checkout configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A cart action names a product the catalog does not have.
    #[error("product {0} does not exist")]
    UnknownProduct(ProductId),

    /// Neither a backend URL nor a fixture was given.
    #[error("scenario has no fixture and no backend URL is configured")]
    MissingFixture,
}

/// One shopper action on the cart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CartStep {
    /// Add units of a product.
    Add {
        product: u64,
        #[serde(default = "one")]
        quantity: u32,
    },

    /// Set a line's quantity.
    Update { product: u64, quantity: i64 },

    /// Remove a line.
    Remove { product: u64 },

    /// Empty the cart.
    Clear,
}

fn one() -> u32 {
    1
}

/// Scenario file.
#[derive(Debug, Deserialize)]
pub(crate) struct Scenario {
    /// Fixture file, relative to the scenario file.
    #[serde(default)]
    pub(crate) fixture: Option<PathBuf>,

    /// Signed-in shopper; anonymous when absent.
    #[serde(default)]
    pub(crate) shopper: Option<Uuid>,

    /// Cart actions, each written as a single-key map such as `add: { product: 1 }`.
    #[serde(default, with = "serde_norway::with::singleton_map_recursive")]
    pub(crate) cart: Vec<CartStep>,

    #[serde(default)]
    pub(crate) checkout: CheckoutDraft,

    #[serde(default)]
    pub(crate) coupon: Option<String>,

    #[serde(default = "card")]
    pub(crate) payment: PaymentMethod,
}

fn card() -> PaymentMethod {
    PaymentMethod::Card
}

impl Scenario {
    /// Read a scenario, resolving its fixture path against the scenario's directory.
    pub(crate) fn load(path: &Path) -> Result<Self, ScenarioError> {
        let mut scenario: Self = serde_norway::from_str(&fs::read_to_string(path)?)?;

        let relative = scenario
            .fixture
            .as_mut()
            .filter(|fixture| fixture.is_relative());

        if let (Some(fixture), Some(dir)) = (relative, path.parent()) {
            *fixture = dir.join(&*fixture);
        }

        Ok(scenario)
    }
}

/// How far the shopper got.
#[derive(Debug)]
pub(crate) enum Verdict {
    /// Sent to the payment page.
    Redirected(PaymentRedirect),

    /// The wizard refused to advance past this step.
    StoppedAt(CheckoutStep, AdvanceError),

    /// Payment could not be started.
    PaymentFailed(PaymentError),
}

/// Everything a run produced.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) currency: &'static Currency,
    pub(crate) items: Vec<CartItem>,
    pub(crate) coupon: Option<String>,
    pub(crate) summary: OrderSummary,
    pub(crate) verdict: Verdict,
    pub(crate) toasts: Vec<Toast>,
}

/// Run `scenario` against the configured backend, or its fixture when none is configured.
pub(crate) async fn run(
    scenario: Scenario,
    checkout: &CheckoutConfig,
    backend: &BackendConfig,
) -> Result<Outcome, ScenarioError> {
    checkout.validate()?;

    let mut checkout = checkout.clone();
    let toasts = ToastLog::new();

    let identity = scenario
        .shopper
        .map_or(Identity::Anonymous, |uuid| {
            Identity::SignedIn(UserId::from_uuid(uuid))
        });

    let cache: Arc<dyn KeyValueCache> = match &backend.cache_dir {
        Some(dir) => Arc::new(FileCache::new(dir)),
        None => Arc::new(MemoryCache::new()),
    };

    let frontend = Frontend {
        identity: Arc::new(SharedIdentity::new(identity)),
        cache,
        navigator: Arc::new(RecordingNavigator::new()),
        notifier: Arc::new(toasts.clone()),
    };

    let context = if let Some((backend_url, payment_url)) = backend.remote() {
        info!(%backend_url, %payment_url, "using remote backend");

        let currency = checkout.currency()?;

        StorefrontContext::from_backend(
            &checkout,
            Arc::new(RestBackend::new(backend_url, currency)),
            Arc::new(HttpPaymentGateway::new(payment_url)),
            frontend,
        )
    } else {
        let path = scenario.fixture.as_ref().ok_or(ScenarioError::MissingFixture)?;
        let fixture = Arc::new(Fixture::load(path)?);

        info!(fixture = %path.display(), "using fixture");

        checkout.currency = fixture.currency().iso_alpha_code.to_string();

        StorefrontContext::from_backend(&checkout, Arc::clone(&fixture), fixture, frontend)
    };

    let currency = iso::find(&checkout.currency)
        .ok_or_else(|| ConfigError::UnknownCurrency(checkout.currency.clone()))?;

    let mut cart = context.cart_store();
    cart.load().await;

    for step in scenario.cart {
        apply(&context, &mut cart, step).await?;
    }

    cart.flush().await;

    let mut machine = context.checkout_machine(&checkout)?;
    machine.restore().await;

    let threshold = context
        .shipping
        .free_shipping_threshold()
        .await
        .unwrap_or_default();

    let mut stopped = None;

    while machine.current_step() != CheckoutStep::Payment {
        let step = machine.current_step();

        if let Err(error) = machine.advance(&scenario.checkout, cart.state()).await {
            stopped = Some(Verdict::StoppedAt(step, error));

            break;
        }
    }

    if let (None, Some(code)) = (&stopped, &scenario.coupon) {
        match machine.apply_coupon(code, cart.total_price()).await {
            Ok(coupon) => info!(code = %coupon.code, "coupon applied"),
            Err(error) => warn!("coupon {code} not applied: {error}"),
        }
    }

    let summary = machine.summary(cart.total_price(), threshold);

    let verdict = match stopped {
        Some(verdict) => verdict,
        None => {
            let mut handshake = context.payment_handshake(&checkout)?;
            handshake.on_page_load().await;

            match handshake
                .initiate(
                    &machine,
                    cart.state(),
                    scenario.payment,
                    &scenario.checkout.honeypot,
                )
                .await
            {
                Ok(redirect) => Verdict::Redirected(redirect),
                Err(error) => Verdict::PaymentFailed(error),
            }
        }
    };

    Ok(Outcome {
        currency,
        items: cart.items().to_vec(),
        coupon: machine.applied_coupon().map(|coupon| coupon.code.clone()),
        summary,
        verdict,
        toasts: toasts.toasts(),
    })
}

async fn apply(
    context: &StorefrontContext,
    cart: &mut CartStore,
    step: CartStep,
) -> Result<(), ScenarioError> {
    match step {
        CartStep::Add { product, quantity } => {
            let id = ProductId::new(product);
            let snapshot = context
                .catalog
                .get_by_id(id)
                .await?
                .ok_or(ScenarioError::UnknownProduct(id))?;

            cart.add_item(snapshot, quantity);
        }
        CartStep::Update { product, quantity } => {
            cart.update_item_quantity(ProductId::new(product), quantity);
        }
        CartStep::Remove { product } => cart.remove_item(ProductId::new(product)),
        CartStep::Clear => cart.clear_cart(),
    }

    Ok(())
}
