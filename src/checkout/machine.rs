//! Checkout Step Machine

use std::sync::Arc;

use jiff::Timestamp;
use rusty_money::iso::Currency;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{CHECKOUT_KEY, KeyValueCache},
    cart::CartState,
    checkout::{
        CheckoutDraft, CheckoutFormData, CheckoutStep, CheckoutStepState, FieldErrors,
        OrderSummary,
        coupons::{CouponError, check_eligibility, normalize_code},
        validation::{validate_personal, validate_shipping},
    },
    config::{CheckoutConfig, ConfigError},
    notify::{Notifier, Toast},
    services::{Coupon, CouponStore, FreeShippingThreshold, ServiceError, SessionRecorder},
};

/// Reasons [`CheckoutMachine::advance`] stays on the current step.
#[derive(Debug, Error)]
pub enum AdvanceError {
    /// The anti-bot field was filled in.
    #[error("submission rejected")]
    Rejected,

    /// Step input failed validation.
    #[error("{} field(s) need attention", .0.len())]
    Validation(FieldErrors),

    /// The payment step is left through the payment handshake, not by advancing.
    #[error("the payment step has no next step")]
    NoNextStep,
}

impl AdvanceError {
    /// Stable key for the localisation layer.
    #[must_use]
    pub const fn message_key(&self) -> &'static str {
        match self {
            Self::Rejected => "checkout.rejected",
            Self::Validation(_) => "checkout.validation",
            Self::NoNextStep => "checkout.no_next_step",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCheckout {
    #[serde(flatten)]
    state: CheckoutStepState,

    #[serde(default)]
    form: CheckoutFormData,
}

/// Three-step checkout wizard.
pub struct CheckoutMachine {
    state: CheckoutStepState,
    form: CheckoutFormData,
    errors: FieldErrors,
    ready: bool,
    currency: &'static Currency,
    flat_shipping_rate: u64,
    cache: Arc<dyn KeyValueCache>,
    recorder: Arc<dyn SessionRecorder>,
    coupons: Arc<dyn CouponStore>,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutMachine {
    /// Create a machine on step 1. Call [`CheckoutMachine::restore`] before showing it.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured currency is unknown.
    pub fn new(
        config: &CheckoutConfig,
        cache: Arc<dyn KeyValueCache>,
        recorder: Arc<dyn SessionRecorder>,
        coupons: Arc<dyn CouponStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            state: CheckoutStepState::default(),
            form: CheckoutFormData::default(),
            errors: FieldErrors::new(),
            ready: false,
            currency: config.currency()?,
            flat_shipping_rate: config.flat_shipping_rate,
            cache,
            recorder,
            coupons,
            notifier,
        })
    }

    /// Step position, completed steps and applied coupon.
    #[must_use]
    pub fn state(&self) -> &CheckoutStepState {
        &self.state
    }

    /// Step on screen.
    #[must_use]
    pub fn current_step(&self) -> CheckoutStep {
        self.state.current_step
    }

    /// Data accepted so far.
    #[must_use]
    pub fn form(&self) -> &CheckoutFormData {
        &self.form
    }

    /// Errors from the last failed [`CheckoutMachine::advance`].
    #[must_use]
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Applied coupon, if any.
    #[must_use]
    pub fn applied_coupon(&self) -> Option<&Coupon> {
        self.state.applied_coupon.as_ref()
    }

    /// Whether restoration has finished; the wizard shows a skeleton until then.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Currency amounts are formatted in.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Resume a checkout left mid-way.
    ///
    /// Entered data is always restored. The step, completed steps and coupon are only restored
    /// past step 1, and only when every step below the saved one is completed; anything else is
    /// discarded.
    #[instrument(name = "checkout.machine.restore", skip(self))]
    pub async fn restore(&mut self) {
        let stored = match self.cache.get(CHECKOUT_KEY).await {
            Ok(stored) => stored,
            Err(error) => {
                warn!("failed to read saved checkout: {error}");

                None
            }
        };

        if let Some(value) = stored {
            match serde_json::from_value::<PersistedCheckout>(value) {
                Ok(saved) if saved.state.is_consistent() => {
                    self.form = saved.form;

                    if saved.state.current_step > CheckoutStep::PersonalInfo {
                        debug!(step = %saved.state.current_step, "resuming checkout");

                        self.state = saved.state;
                    }
                }
                Ok(_) => {
                    warn!("discarding saved checkout with inconsistent steps");

                    self.discard_saved().await;
                }
                Err(error) => {
                    warn!("discarding unreadable saved checkout: {error}");

                    self.discard_saved().await;
                }
            }
        }

        self.ready = true;
    }

    /// Submit the current step.
    ///
    /// On success the sanitised input is stored, mirrored to the session recorder, the step is
    /// marked completed and the machine moves on. Returns the new step.
    ///
    /// # Errors
    ///
    /// Returns [`AdvanceError`] and stays on the current step when the submission is rejected or
    /// invalid, or when called on the payment step.
    #[instrument(name = "checkout.machine.advance", skip_all, fields(step = %self.state.current_step), err)]
    pub async fn advance(
        &mut self,
        draft: &CheckoutDraft,
        cart: &CartState,
    ) -> Result<CheckoutStep, AdvanceError> {
        if draft.is_bot() {
            warn!("rejecting checkout submission with filled honeypot");

            self.notifier.toast(Toast::error(
                AdvanceError::Rejected.message_key(),
                "Something went wrong, please try again",
            ));

            return Err(AdvanceError::Rejected);
        }

        let step = self.state.current_step;

        let Some(next) = step.next() else {
            return Err(AdvanceError::NoNextStep);
        };

        let accepted = match step {
            CheckoutStep::PersonalInfo => validate_personal(&draft.personal).map(|personal| {
                self.form.personal = personal;
            }),
            CheckoutStep::Shipping => validate_shipping(&draft.shipping).map(|shipping| {
                self.form.shipping = shipping;
            }),
            CheckoutStep::Payment => Ok(()),
        };

        if let Err(errors) = accepted {
            if let Some((field, message)) = errors.first() {
                debug!(%field, "checkout step input rejected");

                self.notifier
                    .toast(Toast::error("checkout.validation", message));
            }

            self.errors = errors.clone();

            return Err(AdvanceError::Validation(errors));
        }

        self.errors = FieldErrors::new();

        match step {
            CheckoutStep::PersonalInfo => {
                log_recorder_failure(
                    "personal info",
                    self.recorder.save_personal_info(&self.form.personal).await,
                );
            }
            CheckoutStep::Shipping => {
                log_recorder_failure(
                    "shipping info",
                    self.recorder.save_shipping_info(&self.form.shipping).await,
                );
            }
            CheckoutStep::Payment => {}
        }

        log_recorder_failure(
            "cart snapshot",
            self.recorder.save_cart_snapshot(cart.items()).await,
        );

        self.state.completed_steps.insert(step);
        self.state.current_step = next;

        self.persist().await;

        log_recorder_failure("step", self.recorder.update_step(next).await);

        info!(from = %step, to = %next, "checkout step completed");

        Ok(next)
    }

    /// Jump to `target`, typically to edit an earlier step.
    ///
    /// `target` and every later step lose their completed mark. Jumping ahead of the first
    /// incomplete step is refused and returns `false`.
    #[instrument(name = "checkout.machine.edit_step", skip(self))]
    pub async fn edit_step(&mut self, target: CheckoutStep) -> bool {
        let reachable = target
            .preceding()
            .all(|step| self.state.completed_steps.contains(&step));

        if !reachable {
            debug!("refusing to skip incomplete steps");

            return false;
        }

        self.state.completed_steps.retain(|step| *step < target);
        self.state.current_step = target;

        self.persist().await;

        log_recorder_failure("step", self.recorder.update_step(target).await);

        true
    }

    /// Apply the coupon `code` against the current cart `subtotal`.
    ///
    /// # Errors
    ///
    /// Returns a [`CouponError`] and keeps any previously applied coupon when the code is
    /// malformed, unknown or not redeemable for this order.
    pub async fn apply_coupon(&mut self, code: &str, subtotal: u64) -> Result<Coupon, CouponError> {
        self.apply_coupon_at(code, subtotal, Timestamp::now()).await
    }

    /// [`CheckoutMachine::apply_coupon`] evaluated at `now`.
    ///
    /// # Errors
    ///
    /// See [`CheckoutMachine::apply_coupon`].
    #[instrument(name = "checkout.machine.apply_coupon", skip(self), err)]
    pub async fn apply_coupon_at(
        &mut self,
        code: &str,
        subtotal: u64,
        now: Timestamp,
    ) -> Result<Coupon, CouponError> {
        let result = self.find_eligible_coupon(code, subtotal, now).await;

        let coupon = match result {
            Ok(coupon) => coupon,
            Err(error) => {
                self.notifier
                    .toast(Toast::error(error.message_key(), error.to_string()));

                return Err(error);
            }
        };

        self.state.applied_coupon = Some(coupon.clone());

        self.persist().await;

        log_recorder_failure(
            "promo code",
            self.recorder
                .save_promo_code(Some(coupon.code.clone()))
                .await,
        );

        self.notifier.toast(Toast::success(
            "checkout.coupon.applied",
            format!("Promo code {} applied", coupon.code),
        ));

        info!(code = %coupon.code, "coupon applied");

        Ok(coupon)
    }

    /// Drop the applied coupon.
    #[instrument(name = "checkout.machine.remove_coupon", skip(self))]
    pub async fn remove_coupon(&mut self) {
        if self.state.applied_coupon.take().is_none() {
            return;
        }

        self.persist().await;

        log_recorder_failure("promo code", self.recorder.save_promo_code(None).await);
    }

    /// Check that the applied coupon, if any, is still redeemable against `subtotal` at `now`.
    ///
    /// The record is fetched again, so a coupon that expired or ran out of uses since it was
    /// applied is caught as well as a cart that shrank below its minimum.
    ///
    /// # Errors
    ///
    /// Returns the [`CouponError`] that makes the applied coupon unusable.
    pub async fn revalidate_coupon(&self, subtotal: u64, now: Timestamp) -> Result<(), CouponError> {
        let Some(applied) = &self.state.applied_coupon else {
            return Ok(());
        };

        self.find_eligible_coupon(&applied.code, subtotal, now)
            .await
            .map(|_| ())
    }

    /// Amounts for the payment step, recomputed from the current inputs.
    #[must_use]
    pub fn summary(&self, subtotal: u64, threshold: FreeShippingThreshold) -> OrderSummary {
        OrderSummary::compute(
            subtotal,
            self.state.applied_coupon.as_ref(),
            threshold,
            self.flat_shipping_rate,
        )
    }

    /// Forget the whole checkout, e.g. once payment has completed.
    #[instrument(name = "checkout.machine.reset", skip(self))]
    pub async fn reset(&mut self) {
        self.state = CheckoutStepState::default();
        self.form = CheckoutFormData::default();
        self.errors = FieldErrors::new();

        self.discard_saved().await;
    }

    async fn find_eligible_coupon(
        &self,
        code: &str,
        subtotal: u64,
        now: Timestamp,
    ) -> Result<Coupon, CouponError> {
        let code = normalize_code(code)?;

        let record = self
            .coupons
            .find_active_by_code(&code)
            .await
            .map_err(CouponError::Unavailable)?
            .ok_or(CouponError::NotFound)?;

        check_eligibility(&record, subtotal, now, self.currency)?;

        Ok(record.coupon)
    }

    async fn persist(&self) {
        let saved = PersistedCheckout {
            state: self.state.clone(),
            form: self.form.clone(),
        };

        let value = match serde_json::to_value(&saved) {
            Ok(value) => value,
            Err(error) => {
                warn!("failed to encode checkout: {error}");

                return;
            }
        };

        if let Err(error) = self.cache.set(CHECKOUT_KEY, value).await {
            warn!("failed to save checkout: {error}");
        }
    }

    async fn discard_saved(&self) {
        if let Err(error) = self.cache.remove(CHECKOUT_KEY).await {
            warn!("failed to remove saved checkout: {error}");
        }
    }
}

impl std::fmt::Debug for CheckoutMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutMachine")
            .field("state", &self.state)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

fn log_recorder_failure(what: &str, result: Result<(), ServiceError>) {
    if let Err(error) = result {
        warn!("failed to record checkout {what}: {error}");
    }
}
