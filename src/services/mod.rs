//! External Services
//!
//! Narrow contracts for the collaborators the cart and checkout consume but do not own: the remote
//! cart store, coupon store, stock service, shipping settings, checkout session recorder, payment
//! session endpoint and anti-forgery token service.

use thiserror::Error;

pub mod carts;
pub mod coupons;
pub mod payments;
pub mod recorder;
pub mod shipping;
pub mod stock;

pub use carts::{MockRemoteCartStore, RemoteCartLine, RemoteCartStore};
pub use coupons::{Coupon, CouponDiscount, CouponRecord, CouponStore, MockCouponStore};
pub use payments::{
    AntiForgeryHeaders, AntiForgeryTokens, MockAntiForgeryTokens, MockPaymentSessionEndpoint,
    PaymentDiscount, PaymentLine, PaymentMethod, PaymentSession, PaymentSessionEndpoint,
    PaymentSessionRequest,
};
pub use recorder::{MockSessionRecorder, SessionRecorder};
pub use shipping::{FreeShippingThreshold, MockShippingSettings, ShippingSettings};
pub use stock::{
    MockStockService, ReservationFailure, ReservationLine, ReservationOutcome, StockService,
};

/// Failure reported by an external service.
///
/// The message is what the remote side (or the transport) said; callers that need to classify a
/// failure do so from this text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never produced a response (connection refused, reset, timed out).
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Status {
        /// HTTP-style status code.
        status: u16,

        /// Body or reason returned by the service.
        message: String,
    },

    /// The service answered with a body that could not be understood.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The service rejected the request with an explicit reason.
    #[error("{0}")]
    Rejected(String),
}

impl ServiceError {
    /// What the service or transport said, without the status prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Network(message)
            | Self::UnexpectedResponse(message)
            | Self::Rejected(message)
            | Self::Status { message, .. } => message,
        }
    }
}
