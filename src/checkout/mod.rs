//! Checkout
//!
//! A three-step wizard (personal info → shipping → payment) layered over the cart. The wizard owns
//! the collected form data, per-step validation, the applied coupon, and its own resumability.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::services::Coupon;

pub mod coupons;
pub mod form;
pub mod machine;
pub mod summary;
pub mod validation;

pub use coupons::CouponError;
pub use form::{CheckoutDraft, CheckoutFormData, Field, PersonalInfo, ShippingInfo};
pub use machine::{AdvanceError, CheckoutMachine};
pub use summary::OrderSummary;
pub use validation::FieldErrors;

/// Wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CheckoutStep {
    /// Step 1: name, e-mail, phone.
    PersonalInfo = 1,

    /// Step 2: delivery address.
    Shipping = 2,

    /// Step 3: payment method and order summary. Terminal.
    Payment = 3,
}

impl CheckoutStep {
    /// Step after this one, `None` for the terminal step.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::PersonalInfo => Some(Self::Shipping),
            Self::Shipping => Some(Self::Payment),
            Self::Payment => None,
        }
    }

    /// Steps strictly before this one.
    pub fn preceding(self) -> impl Iterator<Item = Self> {
        [Self::PersonalInfo, Self::Shipping]
            .into_iter()
            .filter(move |step| *step < self)
    }

    /// 1-based step number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }
}

impl From<CheckoutStep> for u8 {
    fn from(step: CheckoutStep) -> Self {
        step.number()
    }
}

impl TryFrom<u8> for CheckoutStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::PersonalInfo),
            2 => Ok(Self::Shipping),
            3 => Ok(Self::Payment),
            other => Err(format!("unknown checkout step {other}")),
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.number(), f)
    }
}

/// Position of the wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutStepState {
    /// Step on screen.
    pub current_step: CheckoutStep,

    /// Steps submitted successfully. The payment step is never marked completed.
    pub completed_steps: BTreeSet<CheckoutStep>,

    /// Coupon applied from the payment step summary.
    #[serde(default)]
    pub applied_coupon: Option<Coupon>,
}

impl Default for CheckoutStepState {
    fn default() -> Self {
        Self {
            current_step: CheckoutStep::PersonalInfo,
            completed_steps: BTreeSet::new(),
            applied_coupon: None,
        }
    }
}

impl CheckoutStepState {
    /// Every step before the current one is completed and the terminal step is not.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.completed_steps.contains(&CheckoutStep::Payment)
            && self
                .current_step
                .preceding()
                .all(|step| self.completed_steps.contains(&step))
    }
}
