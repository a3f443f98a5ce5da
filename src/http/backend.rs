//! REST Backend

use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::Client;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use rusty_money::iso::Currency;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::{
    cart::CartItem,
    checkout::{CheckoutStep, PersonalInfo, ShippingInfo},
    http::{HttpError, endpoint, ensure_success, read_json, read_optional_json},
    identity::UserId,
    pricing::{major_to_minor, percent_from_points},
    products::{CatalogError, ProductCatalog, ProductId, ProductSnapshot},
    services::{
        Coupon, CouponDiscount, CouponRecord, CouponStore, FreeShippingThreshold, RemoteCartLine,
        RemoteCartStore, ReservationLine, ReservationOutcome, ServiceError, SessionRecorder,
        ShippingSettings, StockService,
    },
};

/// JSON backend serving carts, products, coupons, stock, shipping settings and checkout sessions.
#[derive(Debug, Clone)]
pub struct RestBackend {
    base: Url,
    currency: &'static Currency,
    session: Uuid,
    http: Client,
}

impl RestBackend {
    /// Client for the backend at `base`, which reports amounts in `currency` major units.
    ///
    /// Each instance records its checkout progress under a fresh session id.
    #[must_use]
    pub fn new(base: Url, currency: &'static Currency) -> Self {
        Self {
            base,
            currency,
            session: Uuid::now_v7(),
            http: Client::new(),
        }
    }

    /// Id under which checkout progress is recorded.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    fn to_minor(&self, major: f64, what: &str) -> Result<u64, HttpError> {
        major_to_minor(major, self.currency)
            .ok_or_else(|| HttpError::UnexpectedResponse(format!("invalid {what}: {major}")))
    }

    async fn record(&self, topic: &str, body: serde_json::Value) -> Result<(), ServiceError> {
        let session = self.session.to_string();
        let url = endpoint(&self.base, &["checkout-sessions", &session, topic])?;

        let response = self
            .http
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(HttpError::from)?;

        ensure_success(response).await?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    id: u64,
    name: String,
    price: f64,
    #[serde(default)]
    images: Vec<String>,
}

impl ProductRow {
    fn into_snapshot(self, backend: &RestBackend) -> Result<ProductSnapshot, HttpError> {
        Ok(ProductSnapshot {
            id: ProductId::new(self.id),
            price: backend.to_minor(self.price, "product price")?,
            name: self.name,
            images: self.images,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DiscountKind {
    Percentage,
    Fixed,
}

#[derive(Debug, Deserialize)]
struct CouponRow {
    code: String,
    discount_type: DiscountKind,
    discount_value: f64,
    min_order_amount: Option<f64>,
    max_discount_amount: Option<f64>,
    #[serde(default)]
    includes_free_shipping: bool,
    valid_from: Option<Timestamp>,
    valid_until: Option<Timestamp>,
    #[serde(default)]
    usage_count: u32,
    usage_limit: Option<u32>,
}

impl CouponRow {
    fn into_record(self, backend: &RestBackend) -> Result<CouponRecord, HttpError> {
        let discount = match self.discount_type {
            DiscountKind::Percentage => Decimal::from_f64(self.discount_value)
                .and_then(|points| percent_from_points(points).ok())
                .map(CouponDiscount::Percentage)
                .ok_or_else(|| {
                    HttpError::UnexpectedResponse(format!(
                        "invalid coupon percentage: {}",
                        self.discount_value
                    ))
                })?,
            DiscountKind::Fixed => {
                CouponDiscount::Fixed(backend.to_minor(self.discount_value, "coupon value")?)
            }
        };

        let optional = |amount: Option<f64>, what| {
            amount
                .map(|amount| backend.to_minor(amount, what))
                .transpose()
        };

        Ok(CouponRecord {
            coupon: Coupon {
                min_order_amount: optional(self.min_order_amount, "minimum order amount")?,
                max_discount_amount: optional(self.max_discount_amount, "maximum discount")?,
                code: self.code,
                discount,
                includes_free_shipping: self.includes_free_shipping,
            },
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            usage_count: self.usage_count,
            usage_limit: self.usage_limit,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ShippingRow {
    free_shipping_threshold: f64,
    free_shipping_enabled: bool,
}

#[derive(Debug, Serialize)]
struct CartSnapshotLine<'a> {
    product_id: ProductId,
    name: &'a str,
    unit_price: u64,
    quantity: u32,
}

#[async_trait]
impl RemoteCartStore for RestBackend {
    #[instrument(name = "http.backend.list_cart_items", skip(self), err)]
    async fn list_items(&self, user: UserId) -> Result<Vec<RemoteCartLine>, ServiceError> {
        let user = user.to_string();
        let url = endpoint(&self.base, &["carts", &user, "items"])?;

        let response = self.http.get(url).send().await.map_err(HttpError::from)?;

        Ok(read_json(response).await?)
    }

    #[instrument(name = "http.backend.replace_cart_items", skip(self, lines), fields(lines = lines.len()), err)]
    async fn replace_items(
        &self,
        user: UserId,
        lines: &[RemoteCartLine],
    ) -> Result<(), ServiceError> {
        let user = user.to_string();
        let url = endpoint(&self.base, &["carts", &user, "items"])?;

        let response = self
            .http
            .put(url)
            .json(lines)
            .send()
            .await
            .map_err(HttpError::from)?;

        ensure_success(response).await?;

        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for RestBackend {
    #[instrument(name = "http.backend.get_product", skip(self), err)]
    async fn get_by_id(&self, id: ProductId) -> Result<Option<ProductSnapshot>, CatalogError> {
        let id = id.to_string();
        let url = endpoint(&self.base, &["products", &id])?;

        let response = self.http.get(url).send().await.map_err(HttpError::from)?;

        read_optional_json::<ProductRow>(response)
            .await?
            .map(|row| row.into_snapshot(self))
            .transpose()
            .map_err(CatalogError::from)
    }

    #[instrument(name = "http.backend.get_products", skip(self), err)]
    async fn get_all(&self) -> Result<Vec<ProductSnapshot>, CatalogError> {
        let url = endpoint(&self.base, &["products"])?;

        let response = self.http.get(url).send().await.map_err(HttpError::from)?;

        read_json::<Vec<ProductRow>>(response)
            .await?
            .into_iter()
            .map(|row| row.into_snapshot(self).map_err(CatalogError::from))
            .collect()
    }
}

#[async_trait]
impl CouponStore for RestBackend {
    #[instrument(name = "http.backend.find_coupon", skip(self), err)]
    async fn find_active_by_code(&self, code: &str) -> Result<Option<CouponRecord>, ServiceError> {
        let mut url = endpoint(&self.base, &["coupons", code])?;
        url.query_pairs_mut().append_pair("active", "true");

        let response = self.http.get(url).send().await.map_err(HttpError::from)?;

        Ok(read_optional_json::<CouponRow>(response)
            .await?
            .map(|row| row.into_record(self))
            .transpose()?)
    }
}

#[async_trait]
impl StockService for RestBackend {
    #[instrument(name = "http.backend.reserve_stock", skip(self, lines), fields(lines = lines.len()), err)]
    async fn reserve(&self, lines: &[ReservationLine]) -> Result<ReservationOutcome, ServiceError> {
        let url = endpoint(&self.base, &["stock", "reservations"])?;

        let response = self
            .http
            .post(url)
            .json(&json!({ "items": lines }))
            .send()
            .await
            .map_err(HttpError::from)?;

        Ok(read_json(response).await?)
    }
}

#[async_trait]
impl ShippingSettings for RestBackend {
    #[instrument(name = "http.backend.shipping_settings", skip(self), err)]
    async fn free_shipping_threshold(&self) -> Result<FreeShippingThreshold, ServiceError> {
        let url = endpoint(&self.base, &["settings", "shipping"])?;

        let response = self.http.get(url).send().await.map_err(HttpError::from)?;
        let row: ShippingRow = read_json(response).await?;

        Ok(FreeShippingThreshold {
            amount: self.to_minor(row.free_shipping_threshold, "free shipping threshold")?,
            enabled: row.free_shipping_enabled,
        })
    }
}

#[async_trait]
impl SessionRecorder for RestBackend {
    async fn save_personal_info(&self, info: &PersonalInfo) -> Result<(), ServiceError> {
        self.record("personal-info", json!(info)).await
    }

    async fn save_shipping_info(&self, info: &ShippingInfo) -> Result<(), ServiceError> {
        self.record("shipping-info", json!(info)).await
    }

    async fn save_promo_code(&self, code: Option<String>) -> Result<(), ServiceError> {
        self.record("promo-code", json!({ "code": code })).await
    }

    async fn save_cart_snapshot(&self, items: &[CartItem]) -> Result<(), ServiceError> {
        let lines: Vec<CartSnapshotLine<'_>> = items
            .iter()
            .map(|item| CartSnapshotLine {
                product_id: item.id,
                name: &item.product.name,
                unit_price: item.product.price,
                quantity: item.quantity,
            })
            .collect();

        self.record("cart", json!({ "items": lines })).await
    }

    async fn update_step(&self, step: CheckoutStep) -> Result<(), ServiceError> {
        self.record("step", json!({ "step": step })).await
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::EUR;
    use serde_json::from_value;
    use testresult::TestResult;

    use super::*;
    use crate::pricing::percent_points;

    fn backend() -> TestResult<RestBackend> {
        Ok(RestBackend::new(Url::parse("https://api.example/")?, EUR))
    }

    #[test]
    fn product_prices_become_minor_units() -> TestResult {
        let row: ProductRow = from_value(json!({ "id": 3, "name": "Mug", "price": 12.5 }))?;

        let snapshot = row.into_snapshot(&backend()?)?;

        assert_eq!(snapshot.price, 1_250);
        assert_eq!(snapshot.id, ProductId::new(3));

        Ok(())
    }

    #[test]
    fn negative_price_is_rejected() -> TestResult {
        let row: ProductRow = from_value(json!({ "id": 3, "name": "Mug", "price": -1.0 }))?;

        assert!(matches!(
            row.into_snapshot(&backend()?),
            Err(HttpError::UnexpectedResponse(_))
        ));

        Ok(())
    }

    #[test]
    fn coupon_rows_convert_amounts() -> TestResult {
        let row: CouponRow = from_value(json!({
            "code": "SAVE10",
            "discount_type": "percentage",
            "discount_value": 10.0,
            "min_order_amount": 50.0,
            "max_discount_amount": 5.0,
            "valid_until": "2030-01-01T00:00:00Z",
            "usage_count": 2,
            "usage_limit": 100,
        }))?;

        let record = row.into_record(&backend()?)?;

        assert!(matches!(
            record.coupon.discount,
            CouponDiscount::Percentage(percent) if percent_points(percent) == Decimal::TEN
        ));
        assert_eq!(record.coupon.min_order_amount, Some(5_000));
        assert_eq!(record.coupon.max_discount_amount, Some(500));
        assert!(!record.coupon.includes_free_shipping);
        assert_eq!(record.usage_limit, Some(100));

        Ok(())
    }

    #[test]
    fn fixed_coupon_value_is_converted() -> TestResult {
        let row: CouponRow = from_value(json!({
            "code": "TENOFF",
            "discount_type": "fixed",
            "discount_value": 10.0,
            "includes_free_shipping": true,
        }))?;

        let record = row.into_record(&backend()?)?;

        assert_eq!(record.coupon.discount, CouponDiscount::Fixed(1_000));
        assert!(record.coupon.includes_free_shipping);

        Ok(())
    }

    #[test]
    fn each_backend_records_under_its_own_session() -> TestResult {
        assert_ne!(backend()?.session_id(), backend()?.session_id());

        Ok(())
    }
}
