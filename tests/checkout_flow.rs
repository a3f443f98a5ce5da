//! End-to-end checkout flows against an in-memory storefront fixture.

use std::sync::Arc;

use storefront::{
    cache::MemoryCache,
    cart::CartStore,
    checkout::{
        AdvanceError, CheckoutDraft, CheckoutMachine, CheckoutStep, CouponError, PersonalInfo,
        ShippingInfo,
    },
    config::CheckoutConfig,
    context::{Frontend, StorefrontContext},
    fixtures::{Fixture, RecordedEvent},
    identity::SharedIdentity,
    notify::{ToastLevel, ToastLog},
    payment::{NavigationTarget, PaymentError, PaymentLifecycle, RecordingNavigator},
    products::ProductId,
    services::{FreeShippingThreshold, PaymentMethod},
};
use testresult::TestResult;

const STOREFRONT: &str = r"
currency: EUR
products:
  1:
    name: Mug
    price: 45.00 EUR
    stock: 10
  2:
    name: Lamp
    price: 80.00 EUR
    stock: 5
  7:
    name: Vase
    price: 30.00 EUR
    stock: 0
coupons:
  SAVE10:
    percentage: 10%
    min_order: 50.00 EUR
shipping:
  free_shipping_threshold: 150.00 EUR
payments:
  url: https://pay.example/hosted
";

struct Shop {
    fixture: Arc<Fixture>,
    context: StorefrontContext,
    toasts: ToastLog,
    navigator: RecordingNavigator,
    cache: Arc<MemoryCache>,
}

impl Shop {
    fn open(yaml: &str) -> TestResult<Self> {
        Self::open_with_cache(yaml, Arc::new(MemoryCache::new()))
    }

    fn open_with_cache(yaml: &str, cache: Arc<MemoryCache>) -> TestResult<Self> {
        let fixture = Arc::new(Fixture::from_yaml(yaml)?);
        let toasts = ToastLog::new();
        let navigator = RecordingNavigator::new();

        let context = StorefrontContext::from_backend(
            &CheckoutConfig::default(),
            Arc::clone(&fixture),
            Arc::clone(&fixture),
            Frontend {
                identity: Arc::new(SharedIdentity::default()),
                cache: cache.clone(),
                navigator: Arc::new(navigator.clone()),
                notifier: Arc::new(toasts.clone()),
            },
        );

        Ok(Self {
            fixture,
            context,
            toasts,
            navigator,
            cache,
        })
    }

    async fn cart_with(&self, lines: &[(u64, u32)]) -> TestResult<CartStore> {
        let mut cart = self.context.cart_store();
        cart.load().await;

        for &(id, quantity) in lines {
            let product = self
                .fixture
                .product(ProductId::new(id))
                .cloned()
                .ok_or("fixture product missing")?;

            cart.add_item(product, quantity);
        }

        cart.flush().await;

        Ok(cart)
    }

    async fn checkout(&self) -> TestResult<CheckoutMachine> {
        let mut machine = self.context.checkout_machine(&CheckoutConfig::default())?;
        machine.restore().await;

        Ok(machine)
    }
}

fn draft() -> CheckoutDraft {
    CheckoutDraft {
        personal: PersonalInfo {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "Ada@Example.com".to_string(),
            phone: String::new(),
        },
        shipping: ShippingInfo {
            address: "12 Rue de Rivoli".to_string(),
            complement: String::new(),
            postal_code: "75001".to_string(),
            city: "Paris".to_string(),
            country: "FR".to_string(),
        },
        honeypot: String::new(),
    }
}

async fn to_payment_step(
    machine: &mut CheckoutMachine,
    cart: &CartStore,
) -> Result<(), AdvanceError> {
    machine.advance(&draft(), cart.state()).await?;
    machine.advance(&draft(), cart.state()).await?;

    Ok(())
}

#[tokio::test]
async fn cart_survives_a_reload() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;

    let cart = shop.cart_with(&[(1, 2), (2, 1)]).await?;

    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.total_price(), 17_000);

    let reopened = Shop::open_with_cache(STOREFRONT, shop.cache.clone())?;
    let mut reloaded = reopened.context.cart_store();
    reloaded.load().await;

    assert_eq!(reloaded.items(), cart.items());

    Ok(())
}

#[tokio::test]
async fn each_step_is_mirrored_to_the_session_recorder() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;
    let cart = shop.cart_with(&[(1, 1)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    assert_eq!(machine.current_step(), CheckoutStep::Payment);

    let recorded = shop.fixture.recorded();

    assert!(
        matches!(
            recorded.as_slice(),
            [
                RecordedEvent::PersonalInfo(personal),
                RecordedEvent::CartSnapshot(_),
                RecordedEvent::Step(CheckoutStep::Shipping),
                RecordedEvent::ShippingInfo(_),
                RecordedEvent::CartSnapshot(lines),
                RecordedEvent::Step(CheckoutStep::Payment),
            ] if personal.email == "ada@example.com" && lines == &[(ProductId::new(1), 1)]
        ),
        "unexpected recorder log: {recorded:?}"
    );

    Ok(())
}

#[tokio::test]
async fn restored_checkout_resumes_on_the_payment_step() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;
    let cart = shop.cart_with(&[(1, 1)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    let resumed = shop.checkout().await?;

    assert_eq!(resumed.current_step(), CheckoutStep::Payment);
    assert_eq!(resumed.form().shipping.city, "Paris");

    Ok(())
}

#[tokio::test]
async fn save10_is_refused_below_its_minimum() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;
    let mut machine = shop.checkout().await?;

    let result = machine.apply_coupon("SAVE10", 3_000).await;

    assert!(matches!(
        result,
        Err(CouponError::MinimumOrderNotMet { minimum: 5_000, .. })
    ));
    assert!(machine.applied_coupon().is_none());

    let toast = shop.toasts.last().ok_or("expected a toast")?;

    assert_eq!(toast.level, ToastLevel::Error);
    assert!(toast.message.contains("50"), "message should name the minimum");

    let coupon = machine.apply_coupon(" save10 ", 9_000).await?;

    assert_eq!(coupon.code, "SAVE10");
    assert_eq!(machine.summary(9_000, FreeShippingThreshold::default()).discount, 900);

    Ok(())
}

#[tokio::test]
async fn insufficient_stock_stops_before_any_payment_session() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;
    let cart = shop.cart_with(&[(1, 2), (7, 1)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    let mut handshake = shop.context.payment_handshake(&CheckoutConfig::default())?;
    let result = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await;

    let Err(PaymentError::Availability(message)) = result else {
        return Err(format!("expected an availability error, got {result:?}").into());
    };

    assert!(message.contains("Vase"), "message should name the product");
    assert!(shop.fixture.sessions().is_empty());
    assert_eq!(shop.fixture.stock_level(ProductId::new(1)), Some(10));
    assert!(!handshake.is_processing());

    Ok(())
}

#[tokio::test]
async fn coupon_is_checked_again_once_the_cart_shrinks() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;
    let mut cart = shop.cart_with(&[(1, 2)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;
    machine.apply_coupon("SAVE10", cart.total_price()).await?;

    cart.update_item_quantity(ProductId::new(1), 1);
    cart.flush().await;

    let mut handshake = shop.context.payment_handshake(&CheckoutConfig::default())?;
    let result = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await;

    assert!(
        matches!(
            result,
            Err(PaymentError::Coupon(CouponError::MinimumOrderNotMet {
                minimum: 5_000,
                ..
            }))
        ),
        "expected the coupon to be refused, got {result:?}"
    );
    assert!(shop.fixture.sessions().is_empty());
    assert_eq!(shop.fixture.stock_level(ProductId::new(1)), Some(10));
    assert_eq!(
        shop.toasts.last().map(|toast| toast.key),
        Some("checkout.coupon.minimum_order")
    );

    machine.remove_coupon().await;

    let redirect = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await?;

    assert_eq!(redirect.summary.discount, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_gateway_failures_are_retried() -> TestResult {
    let yaml = STOREFRONT.replace(
        "  url: https://pay.example/hosted\n",
        "  url: https://pay.example/hosted\n  failures: [server_error]\n",
    );
    let shop = Shop::open(&yaml)?;
    let cart = shop.cart_with(&[(2, 2)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    let mut handshake = shop.context.payment_handshake(&CheckoutConfig::default())?;
    let redirect = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Wallet, "")
        .await?;

    assert_eq!(redirect.target, NavigationTarget::CurrentWindow);
    assert!(redirect.summary.free_shipping);
    assert_eq!(shop.fixture.sessions().len(), 1);
    assert_eq!(shop.fixture.stock_level(ProductId::new(2)), Some(3));
    assert_eq!(shop.navigator.visits().len(), 1);
    assert_eq!(handshake.lifecycle(), PaymentLifecycle::Pending);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn two_transient_failures_exhaust_the_default_attempts() -> TestResult {
    let yaml = STOREFRONT.replace(
        "  url: https://pay.example/hosted\n",
        "  url: https://pay.example/hosted\n  failures: [network, server_error]\n",
    );
    let shop = Shop::open(&yaml)?;
    let cart = shop.cart_with(&[(1, 1)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    let mut handshake = shop.context.payment_handshake(&CheckoutConfig::default())?;
    let result = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await;

    assert!(matches!(result, Err(PaymentError::TransientNetwork)));
    assert!(shop.fixture.sessions().is_empty());
    assert_eq!(handshake.lifecycle(), PaymentLifecycle::Idle);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_not_retried() -> TestResult {
    let yaml = STOREFRONT.replace(
        "  url: https://pay.example/hosted\n",
        "  url: https://pay.example/hosted\n  failures: [rate_limited]\n",
    );
    let shop = Shop::open(&yaml)?;
    let cart = shop.cart_with(&[(1, 2)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    let mut handshake = shop.context.payment_handshake(&CheckoutConfig::default())?;
    let result = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await;

    assert!(matches!(result, Err(PaymentError::RateLimited)));
    assert!(shop.fixture.sessions().is_empty());

    // The scripted failure was consumed by the single attempt; a manual retry goes through.
    let redirect = handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await?;

    assert_eq!(
        redirect.url.as_str(),
        "https://pay.example/hosted?method=card&session=1"
    );

    Ok(())
}

#[tokio::test]
async fn returning_without_paying_is_recovered_on_reload() -> TestResult {
    let shop = Shop::open(STOREFRONT)?;
    let cart = shop.cart_with(&[(1, 2)]).await?;
    let mut machine = shop.checkout().await?;

    to_payment_step(&mut machine, &cart).await?;

    let config = CheckoutConfig::default();
    let mut handshake = shop.context.payment_handshake(&config)?;
    handshake
        .initiate(&machine, cart.state(), PaymentMethod::Card, "")
        .await?;

    let mut after_reload = shop.context.payment_handshake(&config)?;

    assert_eq!(after_reload.on_page_load().await, PaymentLifecycle::Abandoned);
    assert!(!after_reload.is_processing());

    let mut later = shop.context.payment_handshake(&config)?;

    assert_eq!(later.on_page_load().await, PaymentLifecycle::Idle);

    Ok(())
}
