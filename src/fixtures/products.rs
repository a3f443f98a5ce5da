//! Product Fixtures

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rusty_money::iso::{self, Currency};
use serde::Deserialize;

use crate::{
    fixtures::FixtureError,
    products::{ProductId, ProductSnapshot},
};

/// Product Fixture
#[derive(Debug, Deserialize)]
pub struct ProductFixture {
    /// Product name
    pub name: String,

    /// Product price (e.g., "45.00 EUR")
    pub price: String,

    /// Units available; unlimited when absent
    #[serde(default)]
    pub stock: Option<u32>,

    /// Image URLs
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductFixture {
    /// Build the catalog snapshot for product `id`, checking the price is in `currency`.
    ///
    /// # Errors
    ///
    /// Returns an error if the price is malformed or in another currency.
    pub fn into_snapshot(
        self,
        id: ProductId,
        currency: &'static Currency,
    ) -> Result<ProductSnapshot, FixtureError> {
        let price = parse_price_in(&self.price, currency)?;

        Ok(ProductSnapshot {
            id,
            name: self.name,
            price,
            images: self.images,
        })
    }
}

/// Parse price string (e.g., "45.00 EUR") into minor units and currency
///
/// # Errors
///
/// Returns an error if the string is not `AMOUNT CURRENCY`, the amount is negative, or the
/// currency is unknown.
pub fn parse_price(s: &str) -> Result<(u64, &'static Currency), FixtureError> {
    let mut parts = s.split_whitespace();

    let (Some(amount), Some(code), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FixtureError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    };

    let currency = iso::find(code).ok_or_else(|| FixtureError::UnknownCurrency(code.to_string()))?;

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    let minor_units = 10_u64
        .checked_pow(currency.exponent)
        .and_then(|scale| amount.checked_mul(Decimal::from(scale)))
        .map(|value| value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|value| value.to_u64())
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    Ok((minor_units, currency))
}

/// Parse a price that must be in `currency`.
///
/// # Errors
///
/// Returns [`FixtureError::CurrencyMismatch`] for prices in another currency, or any
/// [`parse_price`] error.
pub fn parse_price_in(s: &str, currency: &'static Currency) -> Result<u64, FixtureError> {
    let (minor_units, found) = parse_price(s)?;

    if found != currency {
        return Err(FixtureError::CurrencyMismatch(
            currency.iso_alpha_code.to_string(),
            found.iso_alpha_code.to_string(),
        ));
    }

    Ok(minor_units)
}
