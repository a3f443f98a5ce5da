//! Fixtures
//!
//! An in-memory storefront loaded from YAML: catalog, coupons, stock levels and shipping settings,
//! plus scripted payment-gateway behaviour. [`Fixture`] implements every external contract, so a
//! whole checkout can run without a backend.

use std::{
    collections::{BTreeMap, VecDeque},
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use rusty_money::iso::{self, Currency};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
    cart::CartItem,
    checkout::{CheckoutStep, PersonalInfo, ShippingInfo, coupons::normalize_code},
    fixtures::{coupons::CouponFixture, products::ProductFixture},
    identity::UserId,
    products::{CatalogError, ProductCatalog, ProductId, ProductSnapshot},
    services::{
        AntiForgeryHeaders, AntiForgeryTokens, CouponRecord, CouponStore, FreeShippingThreshold,
        PaymentMethod, PaymentSession, PaymentSessionEndpoint, PaymentSessionRequest,
        RemoteCartLine, RemoteCartStore, ReservationFailure, ReservationLine,
        ReservationOutcome, ServiceError, SessionRecorder, ShippingSettings, StockService,
    },
};

pub mod coupons;
pub mod products;

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between the fixture and one of its amounts
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// Invalid coupon definition
    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    /// Invalid payment gateway settings
    #[error("Invalid payment settings: {0}")]
    InvalidPayments(String),
}

#[derive(Debug, Deserialize)]
struct StorefrontFixture {
    currency: String,
    #[serde(default)]
    products: BTreeMap<u64, ProductFixture>,
    #[serde(default)]
    coupons: BTreeMap<String, CouponFixture>,
    #[serde(default)]
    shipping: Option<ShippingFixture>,
    #[serde(default)]
    payments: Option<PaymentsFixture>,
}

#[derive(Debug, Deserialize)]
struct ShippingFixture {
    free_shipping_threshold: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PaymentsFixture {
    url: String,
    #[serde(default)]
    failures: Vec<ScriptedFailure>,
}

/// A failure the fixture payment endpoint returns before it starts succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedFailure {
    /// Connection dropped.
    Network,

    /// 503 from the gateway.
    ServerError,

    /// 429 from the gateway.
    RateLimited,

    /// 422 from the gateway.
    Invalid,
}

impl From<ScriptedFailure> for ServiceError {
    fn from(failure: ScriptedFailure) -> Self {
        match failure {
            ScriptedFailure::Network => Self::Network("failed to fetch".to_string()),
            ScriptedFailure::ServerError => Self::Status {
                status: 503,
                message: "Service Unavailable".to_string(),
            },
            ScriptedFailure::RateLimited => Self::Status {
                status: 429,
                message: "Too many requests".to_string(),
            },
            ScriptedFailure::Invalid => Self::Status {
                status: 422,
                message: "Unprocessable Entity".to_string(),
            },
        }
    }
}

/// Something the fixture's session recorder was told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    /// Step 1 data.
    PersonalInfo(PersonalInfo),

    /// Step 2 data.
    ShippingInfo(ShippingInfo),

    /// Coupon code applied or removed.
    PromoCode(Option<String>),

    /// Cart lines as `(product, quantity)`.
    CartSnapshot(Vec<(ProductId, u32)>),

    /// Step change.
    Step(CheckoutStep),
}

#[derive(Debug, Default)]
struct FixtureState {
    stock: FxHashMap<ProductId, u32>,
    remote_carts: FxHashMap<UserId, Vec<RemoteCartLine>>,
    recorded: Vec<RecordedEvent>,
    failures: VecDeque<ScriptedFailure>,
    sessions: Vec<(PaymentMethod, PaymentSessionRequest)>,
    token_generation: u64,
}

/// In-memory storefront.
#[derive(Debug)]
pub struct Fixture {
    currency: &'static Currency,
    products: BTreeMap<ProductId, ProductSnapshot>,
    coupons: FxHashMap<String, CouponRecord>,
    inactive_coupons: Vec<String>,
    shipping: FreeShippingThreshold,
    payment_url: Url,
    state: Mutex<FixtureState>,
}

impl Fixture {
    /// Parse a fixture from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or any amount, coupon or URL is invalid.
    pub fn from_yaml(contents: &str) -> Result<Self, FixtureError> {
        let fixture: StorefrontFixture = serde_norway::from_str(contents)?;

        let currency = iso::find(&fixture.currency)
            .ok_or_else(|| FixtureError::UnknownCurrency(fixture.currency.clone()))?;

        let mut state = FixtureState::default();
        let mut products = BTreeMap::new();

        for (id, product_fixture) in fixture.products {
            let id = ProductId::new(id);

            if let Some(stock) = product_fixture.stock {
                state.stock.insert(id, stock);
            }

            products.insert(id, product_fixture.into_snapshot(id, currency)?);
        }

        let mut coupons = FxHashMap::default();
        let mut inactive_coupons = Vec::new();

        for (code, coupon_fixture) in fixture.coupons {
            let code = normalize_code(&code)
                .map_err(|error| FixtureError::InvalidCoupon(format!("{code}: {error}")))?;

            if coupon_fixture.active {
                coupons.insert(code.clone(), coupon_fixture.into_record(code, currency)?);
            } else {
                inactive_coupons.push(code);
            }
        }

        let shipping = match fixture.shipping {
            Some(shipping) => FreeShippingThreshold {
                amount: products::parse_price_in(&shipping.free_shipping_threshold, currency)?,
                enabled: shipping.enabled,
            },
            None => FreeShippingThreshold::default(),
        };

        let (payment_url, failures) = match fixture.payments {
            Some(payments) => (payments.url, payments.failures),
            None => ("https://payments.invalid/session".to_string(), Vec::new()),
        };

        let payment_url = Url::parse(&payment_url)
            .map_err(|error| FixtureError::InvalidPayments(format!("{payment_url}: {error}")))?;

        state.failures = failures.into();

        Ok(Self {
            currency,
            products,
            coupons,
            inactive_coupons,
            shipping,
            payment_url,
            state: Mutex::new(state),
        })
    }

    /// Load a fixture from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml(&contents)
    }

    /// Currency every amount is in.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Catalog entry for `id`.
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<&ProductSnapshot> {
        self.products.get(&id)
    }

    /// Units left for `id`, `None` when unlimited.
    #[must_use]
    pub fn stock_level(&self, id: ProductId) -> Option<u32> {
        self.lock().ok()?.stock.get(&id).copied()
    }

    /// Everything the session recorder was told, oldest first.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.lock()
            .map(|state| state.recorded.clone())
            .unwrap_or_default()
    }

    /// Every payment session requested, oldest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<(PaymentMethod, PaymentSessionRequest)> {
        self.lock()
            .map(|state| state.sessions.clone())
            .unwrap_or_default()
    }

    /// Coupon codes defined but marked inactive.
    #[must_use]
    pub fn inactive_coupons(&self) -> &[String] {
        &self.inactive_coupons
    }

    fn lock(&self) -> Result<MutexGuard<'_, FixtureState>, ServiceError> {
        self.state
            .lock()
            .map_err(|_poison| ServiceError::UnexpectedResponse("fixture state poisoned".to_string()))
    }

    fn record(&self, event: RecordedEvent) -> Result<(), ServiceError> {
        self.lock()?.recorded.push(event);

        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for Fixture {
    async fn get_by_id(&self, id: ProductId) -> Result<Option<ProductSnapshot>, CatalogError> {
        Ok(self.products.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<ProductSnapshot>, CatalogError> {
        Ok(self.products.values().cloned().collect())
    }
}

#[async_trait]
impl RemoteCartStore for Fixture {
    async fn list_items(&self, user: UserId) -> Result<Vec<RemoteCartLine>, ServiceError> {
        Ok(self
            .lock()?
            .remote_carts
            .get(&user)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_items(
        &self,
        user: UserId,
        lines: &[RemoteCartLine],
    ) -> Result<(), ServiceError> {
        self.lock()?.remote_carts.insert(user, lines.to_vec());

        Ok(())
    }
}

#[async_trait]
impl CouponStore for Fixture {
    async fn find_active_by_code(&self, code: &str) -> Result<Option<CouponRecord>, ServiceError> {
        Ok(self.coupons.get(code).cloned())
    }
}

#[async_trait]
impl StockService for Fixture {
    async fn reserve(&self, lines: &[ReservationLine]) -> Result<ReservationOutcome, ServiceError> {
        let mut state = self.lock()?;

        let errors: Vec<ReservationFailure> = lines
            .iter()
            .filter_map(|line| {
                let error = if self.products.contains_key(&line.product_id) {
                    match state.stock.get(&line.product_id) {
                        Some(&available) if available < line.quantity => {
                            format!("insufficient stock ({available} available)")
                        }
                        _ => return None,
                    }
                } else {
                    "product not found".to_string()
                };

                Some(ReservationFailure {
                    product_id: line.product_id,
                    error,
                })
            })
            .collect();

        if !errors.is_empty() {
            return Ok(ReservationOutcome {
                success: false,
                errors,
            });
        }

        for line in lines {
            if let Some(available) = state.stock.get_mut(&line.product_id) {
                *available = available.saturating_sub(line.quantity);
            }
        }

        Ok(ReservationOutcome {
            success: true,
            errors,
        })
    }
}

#[async_trait]
impl ShippingSettings for Fixture {
    async fn free_shipping_threshold(&self) -> Result<FreeShippingThreshold, ServiceError> {
        Ok(self.shipping)
    }
}

#[async_trait]
impl SessionRecorder for Fixture {
    async fn save_personal_info(&self, info: &PersonalInfo) -> Result<(), ServiceError> {
        self.record(RecordedEvent::PersonalInfo(info.clone()))
    }

    async fn save_shipping_info(&self, info: &ShippingInfo) -> Result<(), ServiceError> {
        self.record(RecordedEvent::ShippingInfo(info.clone()))
    }

    async fn save_promo_code(&self, code: Option<String>) -> Result<(), ServiceError> {
        self.record(RecordedEvent::PromoCode(code))
    }

    async fn save_cart_snapshot(&self, items: &[CartItem]) -> Result<(), ServiceError> {
        self.record(RecordedEvent::CartSnapshot(
            items.iter().map(|item| (item.id, item.quantity)).collect(),
        ))
    }

    async fn update_step(&self, step: CheckoutStep) -> Result<(), ServiceError> {
        self.record(RecordedEvent::Step(step))
    }
}

#[async_trait]
impl PaymentSessionEndpoint for Fixture {
    async fn create_session(
        &self,
        method: PaymentMethod,
        headers: &AntiForgeryHeaders,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let mut state = self.lock()?;

        let expected = format!("fixture-token-{}", state.token_generation);

        if headers.get(TOKEN_HEADER) != Some(&expected) {
            return Err(ServiceError::Status {
                status: 403,
                message: "anti-forgery token mismatch".to_string(),
            });
        }

        if let Some(failure) = state.failures.pop_front() {
            debug!(?failure, "fixture payment endpoint failing as scripted");

            return Err(failure.into());
        }

        state.sessions.push((method, request.clone()));

        let mut url = self.payment_url.clone();
        url.query_pairs_mut()
            .append_pair("method", method.as_str())
            .append_pair("session", &state.sessions.len().to_string());

        Ok(PaymentSession { url })
    }
}

const TOKEN_HEADER: &str = "x-csrf-token";

#[async_trait]
impl AntiForgeryTokens for Fixture {
    async fn get_headers(&self) -> Result<AntiForgeryHeaders, ServiceError> {
        let state = self.lock()?;

        Ok(AntiForgeryHeaders::from([(
            TOKEN_HEADER.to_string(),
            format!("fixture-token-{}", state.token_generation),
        )]))
    }

    async fn regenerate(&self) -> Result<(), ServiceError> {
        self.lock()?.token_generation += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    const YAML: &str = r"
currency: EUR
products:
  1:
    name: Mug
    price: 45.00 EUR
    stock: 5
  7:
    name: Lamp
    price: 80.00 EUR
    stock: 0
coupons:
  save10:
    percentage: 10%
    min_order: 50.00 EUR
  retired:
    fixed: 5.00 EUR
    active: false
shipping:
  free_shipping_threshold: 100.00 EUR
payments:
  url: https://pay.example/checkout
  failures: [network]
";

    #[test]
    fn loads_catalog_coupons_and_shipping() -> TestResult {
        let fixture = Fixture::from_yaml(YAML)?;

        assert_eq!(
            fixture.product(ProductId::new(1)).map(|product| product.price),
            Some(4_500)
        );
        assert_eq!(fixture.stock_level(ProductId::new(7)), Some(0));
        assert!(fixture.coupons.contains_key("SAVE10"));
        assert_eq!(fixture.inactive_coupons(), ["RETIRED".to_string()]);
        assert_eq!(
            fixture.shipping,
            FreeShippingThreshold {
                amount: 10_000,
                enabled: true,
            }
        );

        Ok(())
    }

    #[test]
    fn mismatched_currency_is_rejected() {
        let yaml = "currency: EUR\nproducts:\n  1:\n    name: Mug\n    price: 4.00 USD\n";

        assert!(matches!(
            Fixture::from_yaml(yaml),
            Err(FixtureError::CurrencyMismatch(..))
        ));
    }

    #[tokio::test]
    async fn reservation_is_all_or_nothing() -> TestResult {
        let fixture = Fixture::from_yaml(YAML)?;

        let outcome = fixture
            .reserve(&[
                ReservationLine {
                    product_id: ProductId::new(1),
                    quantity: 2,
                },
                ReservationLine {
                    product_id: ProductId::new(7),
                    quantity: 1,
                },
            ])
            .await?;

        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(fixture.stock_level(ProductId::new(1)), Some(5));

        let outcome = fixture
            .reserve(&[ReservationLine {
                product_id: ProductId::new(1),
                quantity: 2,
            }])
            .await?;

        assert!(outcome.success);
        assert_eq!(fixture.stock_level(ProductId::new(1)), Some(3));

        Ok(())
    }

    #[tokio::test]
    async fn payment_endpoint_checks_token_and_replays_failures() -> TestResult {
        let fixture = Fixture::from_yaml(YAML)?;
        let request = PaymentSessionRequest {
            items: Vec::new(),
            customer_info: crate::checkout::CheckoutFormData::default(),
            discount: None,
            shipping: 0,
        };

        let stale = fixture.get_headers().await?;
        fixture.regenerate().await?;

        assert!(matches!(
            fixture
                .create_session(PaymentMethod::Card, &stale, &request)
                .await,
            Err(ServiceError::Status { status: 403, .. })
        ));

        let fresh = fixture.get_headers().await?;

        assert!(matches!(
            fixture
                .create_session(PaymentMethod::Card, &fresh, &request)
                .await,
            Err(ServiceError::Network(_))
        ));

        let session = fixture
            .create_session(PaymentMethod::Card, &fresh, &request)
            .await?;

        assert_eq!(
            session.url.as_str(),
            "https://pay.example/checkout?method=card&session=1"
        );
        assert_eq!(fixture.sessions().len(), 1);

        Ok(())
    }
}
