//! Payment Initiation Handshake

use std::{sync::Arc, time::Duration};

use jiff::Timestamp;
use rusty_money::iso::Currency;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    cache::{KeyValueCache, PAYMENT_PENDING_KEY},
    cart::CartState,
    checkout::{CheckoutMachine, CheckoutStep, OrderSummary, validation::validate_all},
    config::{CheckoutConfig, ConfigError},
    context::StorefrontContext,
    notify::{Notifier, Toast},
    payment::{
        OrderBounds, PaymentError, PaymentEvent, PaymentLifecycle, PendingMarker,
        navigation::{NavigationTarget, Navigator, redirect},
        retry::retry_with_backoff,
    },
    services::{
        AntiForgeryHeaders, AntiForgeryTokens, FreeShippingThreshold, PaymentDiscount,
        PaymentLine, PaymentMethod, PaymentSession, PaymentSessionEndpoint,
        PaymentSessionRequest, ReservationLine, ShippingSettings, StockService,
    },
};

/// Outcome of a started payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRedirect {
    /// Hosted payment page.
    pub url: Url,

    /// Where the page was opened.
    pub target: NavigationTarget,

    /// Amounts sent to the provider.
    pub summary: OrderSummary,
}

/// Starts hosted payments and recovers from shoppers returning without paying.
pub struct PaymentHandshake {
    lifecycle: PaymentLifecycle,
    processing: bool,
    new_tab_outstanding: bool,
    bounds: OrderBounds,
    currency: &'static Currency,
    max_retries: u32,
    initial_backoff: Duration,
    cache: Arc<dyn KeyValueCache>,
    stock: Arc<dyn StockService>,
    shipping: Arc<dyn ShippingSettings>,
    payments: Arc<dyn PaymentSessionEndpoint>,
    tokens: Arc<dyn AntiForgeryTokens>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentHandshake {
    /// Create an idle handshake.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` is invalid.
    pub fn new(config: &CheckoutConfig, context: &StorefrontContext) -> Result<Self, ConfigError> {
        Ok(Self {
            lifecycle: PaymentLifecycle::Idle,
            processing: false,
            new_tab_outstanding: false,
            bounds: config.order_bounds()?,
            currency: config.currency()?,
            max_retries: config.payment_max_retries,
            initial_backoff: config.initial_backoff(),
            cache: Arc::clone(&context.cache),
            stock: Arc::clone(&context.stock),
            shipping: Arc::clone(&context.shipping),
            payments: Arc::clone(&context.payments),
            tokens: Arc::clone(&context.tokens),
            navigator: Arc::clone(&context.navigator),
            notifier: Arc::clone(&context.notifier),
        })
    }

    /// Where the current payment stands.
    #[must_use]
    pub fn lifecycle(&self) -> PaymentLifecycle {
        self.lifecycle
    }

    /// Whether the submit button should show as busy.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Whether the payment page was opened in a tab that has not been returned from.
    #[must_use]
    pub fn opened_new_tab(&self) -> bool {
        self.new_tab_outstanding
    }

    /// Start paying for `cart` with `method`.
    ///
    /// Runs, in order: the anti-bot check, the order amount guard, a full re-validation of the
    /// checkout data and the applied coupon, a stock reservation for every line, a fresh anti-forgery token, session
    /// creation with retry, and finally the redirect. Any failure stops the sequence before the
    /// next step and is shown to the shopper as a toast.
    ///
    /// # Errors
    ///
    /// Returns the [`PaymentError`] of the step that failed.
    #[instrument(name = "payment.handshake.initiate", skip_all, fields(%method), err)]
    pub async fn initiate(
        &mut self,
        checkout: &CheckoutMachine,
        cart: &CartState,
        method: PaymentMethod,
        honeypot: &str,
    ) -> Result<PaymentRedirect, PaymentError> {
        if self.processing {
            return Err(PaymentError::InProgress);
        }

        self.processing = true;

        let result = self.start(checkout, cart, method, honeypot).await;

        if let Err(error) = &result {
            self.processing = false;

            self.notifier
                .toast(Toast::error(error.message_key(), error.to_string()));
        }

        result
    }

    /// Page loaded: a pending marker left behind means the shopper came back without paying.
    #[instrument(name = "payment.handshake.on_page_load", skip(self))]
    pub async fn on_page_load(&mut self) -> PaymentLifecycle {
        let Some(marker) = self.read_marker().await else {
            return self.lifecycle;
        };

        info!(method = %marker.method, started_at = %marker.started_at, "returned while payment pending");

        self.lifecycle = PaymentLifecycle::from_marker(Some(&marker));

        self.settle(PaymentEvent::ReturnedWithoutPayment).await
    }

    /// Tab shown again: if the payment page was opened in a new tab, the shopper is back here.
    #[instrument(name = "payment.handshake.on_visibility_regained", skip(self))]
    pub async fn on_visibility_regained(&mut self) -> PaymentLifecycle {
        if !self.new_tab_outstanding {
            return self.lifecycle;
        }

        debug!("payment tab left behind");

        self.settle(PaymentEvent::ReturnedWithoutPayment).await
    }

    /// The payment provider reported success.
    #[instrument(name = "payment.handshake.complete", skip(self))]
    pub async fn complete(&mut self) -> PaymentLifecycle {
        if self.lifecycle == PaymentLifecycle::Idle {
            let marker = self.read_marker().await;

            self.lifecycle = PaymentLifecycle::from_marker(marker.as_ref());
        }

        self.settle(PaymentEvent::PaymentConfirmed).await
    }

    /// Clear the pending marker and every busy flag, whatever the current state.
    #[instrument(name = "payment.handshake.recover", skip(self))]
    pub async fn recover(&mut self) -> PaymentLifecycle {
        self.settle(PaymentEvent::ReturnedWithoutPayment).await
    }

    async fn start(
        &mut self,
        checkout: &CheckoutMachine,
        cart: &CartState,
        method: PaymentMethod,
        honeypot: &str,
    ) -> Result<PaymentRedirect, PaymentError> {
        if !honeypot.trim().is_empty() {
            warn!("rejecting payment with filled honeypot");

            return Err(PaymentError::Rejected);
        }

        let step = checkout.current_step();

        if step != CheckoutStep::Payment {
            return Err(PaymentError::WrongStep(step));
        }

        if cart.is_empty() {
            return Err(PaymentError::EmptyCart);
        }

        let subtotal = cart.total_price();

        self.bounds.check(subtotal, self.currency)?;

        let customer_info = validate_all(checkout.form()).map_err(PaymentError::Validation)?;

        checkout
            .revalidate_coupon(subtotal, Timestamp::now())
            .await
            .map_err(PaymentError::Coupon)?;

        self.reserve_stock(cart).await?;

        let summary = checkout.summary(subtotal, self.free_shipping_threshold().await);

        let request = PaymentSessionRequest {
            items: cart
                .items()
                .iter()
                .map(|item| PaymentLine {
                    product_id: item.id,
                    name: item.product.name.clone(),
                    unit_price: item.product.price,
                    quantity: item.quantity,
                })
                .collect(),
            customer_info,
            discount: checkout
                .applied_coupon()
                .filter(|_| summary.discount > 0)
                .map(|coupon| PaymentDiscount {
                    code: coupon.code.clone(),
                    amount: summary.discount,
                }),
            shipping: summary.shipping,
        };

        let headers = self.fresh_headers().await?;
        let session = self.create_session(method, &headers, &request).await?;

        self.write_marker(method, false).await;
        self.lifecycle = self.lifecycle.transition(PaymentEvent::SessionStarted);

        let target = match redirect(self.navigator.as_ref(), &session.url) {
            Ok(target) => target,
            Err(error) => {
                self.clear_marker().await;
                self.lifecycle = self.lifecycle.transition(PaymentEvent::Reset);

                return Err(error.into());
            }
        };

        if target == NavigationTarget::NewTab {
            self.new_tab_outstanding = true;
            self.write_marker(method, true).await;
        }

        info!(?target, total = summary.total, "redirecting to payment page");

        Ok(PaymentRedirect {
            url: session.url,
            target,
            summary,
        })
    }

    /// Reserve every line. Any failing line aborts the whole payment with every reason listed.
    async fn reserve_stock(&self, cart: &CartState) -> Result<(), PaymentError> {
        let lines: Vec<ReservationLine> = cart
            .items()
            .iter()
            .map(|item| ReservationLine {
                product_id: item.id,
                quantity: item.quantity,
            })
            .collect();

        let outcome = self
            .stock
            .reserve(&lines)
            .await
            .map_err(PaymentError::from_session_failure)?;

        if outcome.success && outcome.errors.is_empty() {
            return Ok(());
        }

        let reasons: Vec<String> = outcome
            .errors
            .iter()
            .map(|failure| {
                let name = cart.get(failure.product_id).map_or_else(
                    || format!("Product {}", failure.product_id),
                    |item| item.product.name.clone(),
                );

                format!("{name}: {}", failure.error)
            })
            .collect();

        let message = if reasons.is_empty() {
            "Some products are no longer available".to_string()
        } else {
            reasons.join("; ")
        };

        warn!(failures = outcome.errors.len(), "stock reservation refused");

        Err(PaymentError::Availability(message))
    }

    async fn free_shipping_threshold(&self) -> FreeShippingThreshold {
        self.shipping
            .free_shipping_threshold()
            .await
            .unwrap_or_else(|error| {
                warn!("shipping settings unavailable, charging shipping: {error}");

                FreeShippingThreshold::default()
            })
    }

    async fn fresh_headers(&self) -> Result<AntiForgeryHeaders, PaymentError> {
        if let Err(error) = self.tokens.regenerate().await {
            warn!("failed to regenerate anti-forgery token: {error}");
        }

        self.tokens
            .get_headers()
            .await
            .map_err(PaymentError::Token)
    }

    async fn create_session(
        &self,
        method: PaymentMethod,
        headers: &AntiForgeryHeaders,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        let payments = &self.payments;

        retry_with_backoff(self.max_retries, self.initial_backoff, move |attempt| {
            debug!(attempt, "creating payment session");

            payments.create_session(method, headers, request)
        })
        .await
        .map_err(PaymentError::from_session_failure)
    }

    async fn settle(&mut self, event: PaymentEvent) -> PaymentLifecycle {
        self.clear_marker().await;

        self.processing = false;
        self.new_tab_outstanding = false;
        self.lifecycle = self.lifecycle.transition(event);

        self.lifecycle
    }

    /// A marker that exists but cannot be read still counts as a leftover from a redirect.
    async fn read_marker(&self) -> Option<PendingMarker> {
        let value = match self.cache.get(PAYMENT_PENDING_KEY).await {
            Ok(value) => value?,
            Err(error) => {
                warn!("unreadable payment marker: {error}");

                return Some(unreadable_marker());
            }
        };

        match serde_json::from_value(value) {
            Ok(marker) => Some(marker),
            Err(error) => {
                warn!("unreadable payment marker: {error}");

                Some(unreadable_marker())
            }
        }
    }

    async fn write_marker(&self, method: PaymentMethod, new_tab: bool) {
        let marker = PendingMarker {
            method,
            started_at: Timestamp::now(),
            new_tab,
        };

        let value = match serde_json::to_value(&marker) {
            Ok(value) => value,
            Err(error) => {
                warn!("failed to encode payment marker: {error}");

                return;
            }
        };

        if let Err(error) = self.cache.set(PAYMENT_PENDING_KEY, value).await {
            warn!("failed to save payment marker: {error}");
        }
    }

    async fn clear_marker(&self) {
        if let Err(error) = self.cache.remove(PAYMENT_PENDING_KEY).await {
            warn!("failed to clear payment marker: {error}");
        }
    }
}

fn unreadable_marker() -> PendingMarker {
    PendingMarker {
        method: PaymentMethod::Card,
        started_at: Timestamp::UNIX_EPOCH,
        new_tab: false,
    }
}

impl std::fmt::Debug for PaymentHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentHandshake")
            .field("lifecycle", &self.lifecycle)
            .field("processing", &self.processing)
            .field("new_tab_outstanding", &self.new_tab_outstanding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use testresult::TestResult;

    use crate::{
        cache::{CHECKOUT_KEY, FileCache, MemoryCache},
        cart::CartAction,
        identity::SharedIdentity,
        notify::ToastLog,
        payment::navigation::RecordingNavigator,
        products::{MockProductCatalog, ProductId, ProductSnapshot},
        services::{
            MockAntiForgeryTokens, MockCouponStore, MockPaymentSessionEndpoint,
            MockRemoteCartStore, MockSessionRecorder, MockShippingSettings, MockStockService,
            ReservationFailure, ReservationOutcome, ServiceError,
        },
    };

    use super::*;

    struct Harness {
        cache: Arc<MemoryCache>,
        toasts: ToastLog,
        navigator: RecordingNavigator,
        stock: MockStockService,
        payments: MockPaymentSessionEndpoint,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                cache: Arc::new(MemoryCache::new()),
                toasts: ToastLog::new(),
                navigator: RecordingNavigator::new(),
                stock: MockStockService::new(),
                payments: MockPaymentSessionEndpoint::new(),
            }
        }

        fn stock_ok(mut self) -> Self {
            self.stock.expect_reserve().returning(|_| {
                Ok(ReservationOutcome {
                    success: true,
                    errors: Vec::new(),
                })
            });

            self
        }

        fn context(self) -> (StorefrontContext, Arc<MemoryCache>, ToastLog, RecordingNavigator) {
            let mut shipping = MockShippingSettings::new();
            shipping.expect_free_shipping_threshold().returning(|| {
                Ok(FreeShippingThreshold {
                    amount: 10_000,
                    enabled: true,
                })
            });

            let mut tokens = MockAntiForgeryTokens::new();
            tokens.expect_regenerate().returning(|| Ok(()));
            tokens.expect_get_headers().returning(|| {
                Ok(AntiForgeryHeaders::from([(
                    "x-csrf-token".to_string(),
                    "token".to_string(),
                )]))
            });

            let mut recorder = MockSessionRecorder::new();
            recorder.expect_update_step().returning(|_| Ok(()));
            recorder.expect_save_promo_code().returning(|_| Ok(()));

            let context = StorefrontContext {
                identity: Arc::new(SharedIdentity::default()),
                cache: self.cache.clone(),
                catalog: Arc::new(MockProductCatalog::new()),
                remote_carts: Arc::new(MockRemoteCartStore::new()),
                coupons: Arc::new(MockCouponStore::new()),
                stock: Arc::new(self.stock),
                shipping: Arc::new(shipping),
                recorder: Arc::new(recorder),
                payments: Arc::new(self.payments),
                tokens: Arc::new(tokens),
                navigator: Arc::new(self.navigator.clone()),
                notifier: Arc::new(self.toasts.clone()),
            };

            (context, self.cache, self.toasts, self.navigator)
        }
    }

    fn config() -> CheckoutConfig {
        CheckoutConfig {
            payment_initial_backoff_ms: 1_000,
            payment_max_retries: 2,
            ..CheckoutConfig::default()
        }
    }

    fn cart() -> CartState {
        CartState::new()
            .reduce(CartAction::AddItem {
                product: ProductSnapshot::new(1, "Mug", 4_500),
                quantity: 2,
            })
            .reduce(CartAction::AddItem {
                product: ProductSnapshot::new(7, "Lamp", 8_000),
                quantity: 1,
            })
    }

    fn session_url() -> Result<Url, url::ParseError> {
        Url::parse("https://pay.example/session/abc")
    }

    async fn checkout_on_payment_step(
        context: &StorefrontContext,
        cache: &MemoryCache,
    ) -> TestResult<CheckoutMachine> {
        cache
            .set(
                CHECKOUT_KEY,
                json!({
                    "current_step": 3,
                    "completed_steps": [1, 2],
                    "form": {
                        "personal": {
                            "first_name": "Zoë",
                            "last_name": "Durand",
                            "email": "zoe@example.com",
                        },
                        "shipping": {
                            "address": "12 rue des Lilas",
                            "postal_code": "75011",
                            "city": "Paris",
                            "country": "FR",
                        },
                    },
                }),
            )
            .await?;

        let mut checkout = context.checkout_machine(&config())?;
        checkout.restore().await;

        Ok(checkout)
    }

    #[tokio::test]
    async fn successful_payment_redirects_and_marks_pending() -> TestResult {
        let mut harness = Harness::new().stock_ok();
        let url = session_url()?;

        let returned = url.clone();
        harness
            .payments
            .expect_create_session()
            .times(1)
            .returning(move |method, headers, request| {
                assert_eq!(method, PaymentMethod::Card);
                assert!(headers.contains_key("x-csrf-token"));
                assert_eq!(request.items.len(), 2);
                assert_eq!(request.shipping, 0);

                Ok(PaymentSession {
                    url: returned.clone(),
                })
            });

        let (context, cache, toasts, navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        let redirect = handshake
            .initiate(&checkout, &cart(), PaymentMethod::Card, "")
            .await?;

        assert_eq!(redirect.url, url);
        assert_eq!(redirect.target, NavigationTarget::CurrentWindow);
        assert_eq!(redirect.summary.total, 17_000);
        assert_eq!(handshake.lifecycle(), PaymentLifecycle::Pending);
        assert!(handshake.is_processing());
        assert!(cache.get(PAYMENT_PENDING_KEY).await?.is_some());
        assert_eq!(navigator.visits().len(), 1);
        assert!(toasts.toasts().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn stock_failure_aborts_before_payment_call() -> TestResult {
        let mut harness = Harness::new();

        harness.stock.expect_reserve().times(1).returning(|_| {
            Ok(ReservationOutcome {
                success: false,
                errors: vec![ReservationFailure {
                    product_id: ProductId::new(7),
                    error: "insufficient stock".to_string(),
                }],
            })
        });
        harness.payments.expect_create_session().never();

        let (context, cache, toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        let result = handshake
            .initiate(&checkout, &cart(), PaymentMethod::Card, "")
            .await;

        let Err(PaymentError::Availability(message)) = result else {
            return Err(format!("expected availability error, got {result:?}").into());
        };

        assert!(message.contains("Lamp"), "{message}");
        assert!(message.contains("insufficient stock"), "{message}");
        assert!(!handshake.is_processing());
        assert_eq!(cache.get(PAYMENT_PENDING_KEY).await?, None);
        assert_eq!(
            toasts.last().map(|toast| toast.key),
            Some("checkout.payment.availability")
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_session_failures_are_retried() -> TestResult {
        let mut harness = Harness::new().stock_ok();
        let url = session_url()?;

        let mut calls = 0;
        harness
            .payments
            .expect_create_session()
            .times(3)
            .returning(move |_, _, _| {
                calls += 1;

                if calls < 3 {
                    Err(ServiceError::Network("failed to fetch".to_string()))
                } else {
                    Ok(PaymentSession { url: url.clone() })
                }
            });

        let (context, cache, _toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        handshake
            .initiate(&checkout, &cart(), PaymentMethod::Wallet, "")
            .await?;

        assert_eq!(handshake.lifecycle(), PaymentLifecycle::Pending);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_a_network_error() -> TestResult {
        let mut harness = Harness::new().stock_ok();

        harness
            .payments
            .expect_create_session()
            .times(3)
            .returning(|_, _, _| {
                Err(ServiceError::Status {
                    status: 503,
                    message: "upstream timeout".to_string(),
                })
            });

        let (context, cache, _toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        let result = handshake
            .initiate(&checkout, &cart(), PaymentMethod::Card, "")
            .await;

        assert!(matches!(result, Err(PaymentError::TransientNetwork)));
        assert!(!handshake.is_processing());
        assert_eq!(handshake.lifecycle(), PaymentLifecycle::Idle);

        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() -> TestResult {
        let mut harness = Harness::new().stock_ok();

        harness
            .payments
            .expect_create_session()
            .times(1)
            .returning(|_, _, _| {
                Err(ServiceError::Status {
                    status: 429,
                    message: "Too many requests".to_string(),
                })
            });

        let (context, cache, _toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        let result = handshake
            .initiate(&checkout, &cart(), PaymentMethod::Card, "")
            .await;

        assert!(matches!(result, Err(PaymentError::RateLimited)));

        Ok(())
    }

    #[tokio::test]
    async fn order_below_minimum_never_reaches_the_backend() -> TestResult {
        let mut harness = Harness::new();
        harness.stock.expect_reserve().never();
        harness.payments.expect_create_session().never();

        let (context, cache, _toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;

        let strict = CheckoutConfig {
            min_order_amount: 100_000,
            ..config()
        };

        let mut handshake = context.payment_handshake(&strict)?;

        let result = handshake
            .initiate(&checkout, &cart(), PaymentMethod::Card, "")
            .await;

        let Err(error) = result else {
            return Err("expected minimum order error".into());
        };

        assert!(matches!(
            error,
            PaymentError::BelowMinimumOrder {
                minimum: 100_000,
                ..
            }
        ));
        assert!(!error.is_recoverable());

        Ok(())
    }

    #[tokio::test]
    async fn honeypot_and_wrong_step_are_rejected_locally() -> TestResult {
        let mut harness = Harness::new();
        harness.stock.expect_reserve().never();
        harness.payments.expect_create_session().never();

        let (context, cache, _toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        assert!(matches!(
            handshake
                .initiate(&checkout, &cart(), PaymentMethod::Card, "bot")
                .await,
            Err(PaymentError::Rejected)
        ));

        let fresh = context.checkout_machine(&config())?;

        assert!(matches!(
            handshake
                .initiate(&fresh, &cart(), PaymentMethod::Card, "")
                .await,
            Err(PaymentError::WrongStep(CheckoutStep::PersonalInfo))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn new_tab_payment_recovers_when_tab_is_shown_again() -> TestResult {
        let mut harness = Harness::new().stock_ok();
        harness.navigator = RecordingNavigator::cross_origin_frame();

        let url = session_url()?;
        harness
            .payments
            .expect_create_session()
            .returning(move |_, _, _| Ok(PaymentSession { url: url.clone() }));

        let (context, cache, _toasts, _navigator) = harness.context();
        let checkout = checkout_on_payment_step(&context, &cache).await?;
        let mut handshake = context.payment_handshake(&config())?;

        let redirect = handshake
            .initiate(&checkout, &cart(), PaymentMethod::Card, "")
            .await?;

        assert_eq!(redirect.target, NavigationTarget::NewTab);
        assert!(handshake.opened_new_tab());

        assert_eq!(
            handshake.on_visibility_regained().await,
            PaymentLifecycle::Abandoned
        );
        assert!(!handshake.is_processing());
        assert!(!handshake.opened_new_tab());
        assert_eq!(cache.get(PAYMENT_PENDING_KEY).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn leftover_marker_is_cleared_on_page_load() -> TestResult {
        let (context, cache, _toasts, _navigator) = Harness::new().context();

        cache
            .set(
                PAYMENT_PENDING_KEY,
                json!({ "method": "card", "started_at": "2026-01-01T10:00:00Z" }),
            )
            .await?;

        let mut handshake = context.payment_handshake(&config())?;

        assert_eq!(handshake.on_page_load().await, PaymentLifecycle::Abandoned);
        assert_eq!(cache.get(PAYMENT_PENDING_KEY).await?, None);
        assert_eq!(handshake.on_page_load().await, PaymentLifecycle::Abandoned);

        Ok(())
    }

    #[tokio::test]
    async fn corrupt_marker_file_is_cleared_on_page_load() -> TestResult {
        let dir = tempfile::tempdir()?;
        let marker = dir.path().join(format!("{PAYMENT_PENDING_KEY}.json"));
        std::fs::write(&marker, "{ not json")?;

        let (mut context, _cache, _toasts, _navigator) = Harness::new().context();
        context.cache = Arc::new(FileCache::new(dir.path()));

        let mut handshake = context.payment_handshake(&config())?;

        assert_eq!(handshake.on_page_load().await, PaymentLifecycle::Abandoned);
        assert!(!marker.exists(), "marker file should be removed");
        assert_eq!(handshake.on_page_load().await, PaymentLifecycle::Abandoned);

        Ok(())
    }

    #[tokio::test]
    async fn completion_after_redirect_is_recorded() -> TestResult {
        let (context, cache, _toasts, _navigator) = Harness::new().context();

        cache
            .set(
                PAYMENT_PENDING_KEY,
                json!({ "method": "wallet", "started_at": "2026-01-01T10:00:00Z" }),
            )
            .await?;

        let mut handshake = context.payment_handshake(&config())?;

        assert_eq!(handshake.complete().await, PaymentLifecycle::Completed);
        assert_eq!(cache.get(PAYMENT_PENDING_KEY).await?, None);

        Ok(())
    }
}
