//! Payment Session Endpoint & Anti-forgery Tokens

use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{checkout::CheckoutFormData, products::ProductId, services::ServiceError};

/// Payment method chosen on the payment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card checkout page.
    Card,

    /// Alternate wallet checkout page.
    Wallet,
}

impl PaymentMethod {
    /// Stable name used in URLs and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the order sent to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLine {
    /// Product reference.
    pub product_id: ProductId,

    /// Product name at add-time.
    pub name: String,

    /// Unit price in minor units.
    pub unit_price: u64,

    /// Units ordered.
    pub quantity: u32,
}

/// Coupon discount forwarded to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDiscount {
    /// Coupon code.
    pub code: String,

    /// Discount in minor units.
    pub amount: u64,
}

/// Body of a payment-session creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSessionRequest {
    /// Order lines.
    pub items: Vec<PaymentLine>,

    /// Collected customer details.
    pub customer_info: CheckoutFormData,

    /// Applied coupon, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<PaymentDiscount>,

    /// Shipping charged, in minor units.
    pub shipping: u64,
}

/// A created payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Page the shopper must be sent to.
    pub url: Url,
}

/// Headers carrying a fresh anti-forgery token.
pub type AntiForgeryHeaders = BTreeMap<String, String>;

/// Creates hosted payment sessions.
#[automock]
#[async_trait]
pub trait PaymentSessionEndpoint: Send + Sync {
    /// Create a session for `request` on the page matching `method`.
    async fn create_session(
        &self,
        method: PaymentMethod,
        headers: &AntiForgeryHeaders,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ServiceError>;
}

/// Issues anti-forgery tokens for outbound requests.
#[automock]
#[async_trait]
pub trait AntiForgeryTokens: Send + Sync {
    /// Headers carrying the current token.
    async fn get_headers(&self) -> Result<AntiForgeryHeaders, ServiceError>;

    /// Discard the current token and obtain a new one.
    async fn regenerate(&self) -> Result<(), ServiceError>;
}
