//! Payment Lifecycle

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::services::PaymentMethod;

/// Where the current payment stands.
///
/// A durable [`PendingMarker`] is present exactly while the lifecycle is `Pending`, so a fresh
/// page load can tell that the shopper left for the payment page and came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentLifecycle {
    /// No payment started.
    #[default]
    Idle,

    /// The shopper was sent to the payment page.
    Pending,

    /// The payment page reported success.
    Completed,

    /// The shopper came back without paying.
    Abandoned,
}

/// Something that happened to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A payment session was created and the shopper is being redirected.
    SessionStarted,

    /// The payment provider sent the shopper back after paying.
    PaymentConfirmed,

    /// The page was loaded or shown again while a payment was pending.
    ReturnedWithoutPayment,

    /// Start over.
    Reset,
}

impl PaymentLifecycle {
    /// Lifecycle implied by the presence of a pending marker.
    #[must_use]
    pub fn from_marker(marker: Option<&PendingMarker>) -> Self {
        if marker.is_some() {
            Self::Pending
        } else {
            Self::Idle
        }
    }

    /// Apply `event`. Events that make no sense in the current state leave it unchanged.
    #[must_use]
    pub fn transition(self, event: PaymentEvent) -> Self {
        match (self, event) {
            (_, PaymentEvent::Reset) => Self::Idle,
            (_, PaymentEvent::SessionStarted) => Self::Pending,
            (Self::Pending, PaymentEvent::PaymentConfirmed) => Self::Completed,
            (Self::Pending, PaymentEvent::ReturnedWithoutPayment) => Self::Abandoned,
            (state, _) => state,
        }
    }

    /// Whether the shopper is away at the payment page.
    #[must_use]
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }
}

/// Durable record of a payment in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMarker {
    /// Method chosen.
    pub method: PaymentMethod,

    /// When the redirect happened.
    pub started_at: Timestamp,

    /// Whether the payment page was opened in a new tab.
    #[serde(default)]
    pub new_tab: bool,
}
