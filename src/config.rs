//! Checkout configuration

use std::time::Duration;

use clap::Args;
use rusty_money::iso::{self, Currency};
use thiserror::Error;

use crate::{cache::is_valid_key, payment::OrderBounds};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The currency code is not a known ISO 4217 code.
    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Minimum and maximum order amounts contradict each other.
    #[error("minimum order amount {min} exceeds maximum order amount {max}")]
    InvertedOrderBounds {
        /// Configured minimum.
        min: u64,

        /// Configured maximum.
        max: u64,
    },

    /// The cache namespace cannot be part of a cache key.
    #[error("invalid cache namespace {0:?}: use ASCII letters, digits, '-', '_', ':' or '.'")]
    InvalidCacheNamespace(String),
}

/// Business rules and tuning for the checkout.
#[derive(Debug, Clone, Args)]
pub struct CheckoutConfig {
    /// Smallest subtotal (minor units) that may be paid; 0 disables the check
    #[arg(long, env = "MIN_ORDER_AMOUNT", default_value_t = 0)]
    pub min_order_amount: u64,

    /// Largest subtotal (minor units) that may be paid; 0 disables the check
    #[arg(long, env = "MAX_ORDER_AMOUNT", default_value_t = 0)]
    pub max_order_amount: u64,

    /// Shipping charged (minor units) when shipping is not free
    #[arg(long, env = "FLAT_SHIPPING_RATE", default_value_t = 590)]
    pub flat_shipping_rate: u64,

    /// Retries of a transient payment-session failure
    #[arg(long, env = "PAYMENT_MAX_RETRIES", default_value_t = 1)]
    pub payment_max_retries: u32,

    /// Delay before the first payment-session retry, doubled for each further retry
    #[arg(long, env = "PAYMENT_INITIAL_BACKOFF_MS", default_value_t = 1_000)]
    pub payment_initial_backoff_ms: u64,

    /// ISO 4217 code used to format amounts
    #[arg(long, env = "CURRENCY", default_value = "EUR")]
    pub currency: String,

    /// Prefix of every persisted cache key
    #[arg(long, env = "CACHE_NAMESPACE", default_value = "storefront")]
    pub cache_namespace: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            min_order_amount: 0,
            max_order_amount: 0,
            flat_shipping_rate: 590,
            payment_max_retries: 1,
            payment_initial_backoff_ms: 1_000,
            currency: "EUR".to_string(),
            cache_namespace: "storefront".to_string(),
        }
    }
}

impl CheckoutConfig {
    /// Resolve the configured currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCurrency`] for unknown codes.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        iso::find(&self.currency.to_uppercase())
            .ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }

    /// Allowed subtotal range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvertedOrderBounds`] when both bounds are set and min > max.
    pub fn order_bounds(&self) -> Result<OrderBounds, ConfigError> {
        let (min, max) = (self.min_order_amount, self.max_order_amount);

        if min > 0 && max > 0 && min > max {
            return Err(ConfigError::InvertedOrderBounds { min, max });
        }

        Ok(OrderBounds { min, max })
    }

    /// Prefix of every persisted cache key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCacheNamespace`] when the namespace cannot be stored.
    pub fn cache_namespace(&self) -> Result<&str, ConfigError> {
        if is_valid_key(&self.cache_namespace) {
            Ok(&self.cache_namespace)
        } else {
            Err(ConfigError::InvalidCacheNamespace(
                self.cache_namespace.clone(),
            ))
        }
    }

    /// Delay before the first payment retry.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.payment_initial_backoff_ms)
    }

    /// Check the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.currency()?;
        self.order_bounds()?;
        self.cache_namespace()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_are_valid() -> TestResult {
        let config = CheckoutConfig::default();

        config.validate()?;

        assert_eq!(config.currency()?.iso_alpha_code, "EUR");
        assert_eq!(config.initial_backoff(), Duration::from_secs(1));

        Ok(())
    }

    #[test]
    fn unknown_currency_is_rejected() {
        let config = CheckoutConfig {
            currency: "XYZ".to_string(),
            ..CheckoutConfig::default()
        };

        assert!(matches!(
            config.currency(),
            Err(ConfigError::UnknownCurrency(code)) if code == "XYZ"
        ));
    }

    #[test]
    fn cache_namespace_must_be_a_storable_key() {
        for namespace in ["my shop", "shop/eu", "", ".hidden"] {
            let config = CheckoutConfig {
                cache_namespace: namespace.to_string(),
                ..CheckoutConfig::default()
            };

            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidCacheNamespace(_))),
                "{namespace:?} should be rejected"
            );
        }

        let config = CheckoutConfig {
            cache_namespace: "shop-eu.v2".to_string(),
            ..CheckoutConfig::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let config = CheckoutConfig {
            min_order_amount: 10_000,
            max_order_amount: 5_000,
            ..CheckoutConfig::default()
        };

        assert!(matches!(
            config.order_bounds(),
            Err(ConfigError::InvertedOrderBounds { .. })
        ));
    }
}
