//! Payment
//!
//! Turns a completed checkout into a hosted payment session: business-rule guard, re-validation,
//! stock reservation, session creation with retry, and the redirect. Tracks the payment through
//! [`PaymentLifecycle`] so a shopper returning without paying is never stuck on a spinning button.

use rusty_money::iso::Currency;
use thiserror::Error;

use crate::{
    checkout::{CheckoutStep, CouponError, FieldErrors},
    pricing::format_amount,
    services::ServiceError,
};

pub mod handshake;
pub mod lifecycle;
pub mod navigation;
pub mod retry;

pub use handshake::{PaymentHandshake, PaymentRedirect};
pub use lifecycle::{PaymentEvent, PaymentLifecycle, PendingMarker};
pub use navigation::{
    MockNavigator, NavigationError, NavigationTarget, Navigator, RecordingNavigator,
};
pub use retry::{Backoff, FailureKind, classify, retry_with_backoff};

/// Reasons a payment could not be started.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The anti-bot field was filled in.
    #[error("Something went wrong, please try again")]
    Rejected,

    /// A payment is already being started.
    #[error("Your payment is already being processed")]
    InProgress,

    /// Payment is only possible from the payment step.
    #[error("Please complete the previous steps first")]
    WrongStep(CheckoutStep),

    /// Nothing to pay for.
    #[error("Your cart is empty")]
    EmptyCart,

    /// The subtotal is below the configured minimum.
    #[error("A minimum order of {formatted} is required")]
    BelowMinimumOrder {
        /// Minimum subtotal in minor units.
        minimum: u64,

        /// Minimum formatted in the store currency.
        formatted: String,
    },

    /// The subtotal is above the configured maximum.
    #[error("Orders above {formatted} cannot be paid online")]
    AboveMaximumOrder {
        /// Maximum subtotal in minor units.
        maximum: u64,

        /// Maximum formatted in the store currency.
        formatted: String,
    },

    /// Collected data no longer validates.
    #[error("Please check your details")]
    Validation(FieldErrors),

    /// The applied coupon is no longer redeemable for this order.
    #[error("{0}")]
    Coupon(#[source] CouponError),

    /// One or more products cannot be reserved; the message lists each product and reason.
    #[error("{0}")]
    Availability(String),

    /// The payment provider is throttling requests.
    #[error("Too many attempts, please wait a moment and try again")]
    RateLimited,

    /// The payment provider refused the order details.
    #[error("Some order details were refused, please review them")]
    InvalidInput,

    /// The network failed on every attempt.
    #[error("Network error, please check your connection and try again")]
    TransientNetwork,

    /// Any other payment failure.
    #[error("Payment could not be started, please try again")]
    Payment(#[source] ServiceError),

    /// No anti-forgery token could be obtained.
    #[error("Your session has expired, please try again")]
    Token(#[source] ServiceError),

    /// The payment page could not be opened.
    #[error("The payment page could not be opened")]
    Navigation(#[from] NavigationError),
}

impl PaymentError {
    /// Stable key for the localisation layer.
    #[must_use]
    pub const fn message_key(&self) -> &'static str {
        match self {
            Self::Rejected => "checkout.rejected",
            Self::InProgress => "checkout.payment.in_progress",
            Self::WrongStep(_) => "checkout.payment.wrong_step",
            Self::EmptyCart => "checkout.payment.empty_cart",
            Self::BelowMinimumOrder { .. } => "checkout.payment.minimum_order",
            Self::AboveMaximumOrder { .. } => "checkout.payment.maximum_order",
            Self::Validation(_) => "checkout.validation",
            Self::Coupon(error) => error.message_key(),
            Self::Availability(_) => "checkout.payment.availability",
            Self::RateLimited => "checkout.payment.rate_limited",
            Self::InvalidInput => "checkout.payment.invalid_input",
            Self::TransientNetwork => "checkout.payment.network",
            Self::Payment(_) => "checkout.payment.failed",
            Self::Token(_) => "checkout.payment.token",
            Self::Navigation(_) => "checkout.payment.navigation",
        }
    }

    /// Whether retrying the same cart can succeed. Order bound violations need a cart change.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::BelowMinimumOrder { .. } | Self::AboveMaximumOrder { .. } | Self::EmptyCart
        )
    }

    /// Map a payment-session failure that survived the retries.
    #[must_use]
    pub fn from_session_failure(error: ServiceError) -> Self {
        match classify(&error) {
            FailureKind::Transient => Self::TransientNetwork,
            FailureKind::RateLimited => Self::RateLimited,
            FailureKind::InvalidInput => Self::InvalidInput,
            FailureKind::Availability => Self::Availability(error.message().to_string()),
            FailureKind::Other => Self::Payment(error),
        }
    }
}

/// Allowed subtotal range. A zero bound is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderBounds {
    /// Smallest payable subtotal.
    pub min: u64,

    /// Largest payable subtotal.
    pub max: u64,
}

impl OrderBounds {
    /// Check `subtotal` against the bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::BelowMinimumOrder`] or [`PaymentError::AboveMaximumOrder`].
    pub fn check(self, subtotal: u64, currency: &'static Currency) -> Result<(), PaymentError> {
        if self.min > 0 && subtotal < self.min {
            return Err(PaymentError::BelowMinimumOrder {
                minimum: self.min,
                formatted: format_amount(self.min, currency),
            });
        }

        if self.max > 0 && subtotal > self.max {
            return Err(PaymentError::AboveMaximumOrder {
                maximum: self.max,
                formatted: format_amount(self.max, currency),
            });
        }

        Ok(())
    }
}
