//! Checkout Form Data

use std::fmt;

use serde::{Deserialize, Serialize};

/// Personal details collected on step 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersonalInfo {
    /// Given name.
    pub first_name: String,

    /// Family name.
    pub last_name: String,

    /// Contact e-mail, lower-cased.
    pub email: String,

    /// Contact phone, empty when not given.
    #[serde(default)]
    pub phone: String,
}

/// Delivery details collected on step 2.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingInfo {
    /// Street address.
    pub address: String,

    /// Apartment, floor, building.
    #[serde(default)]
    pub complement: String,

    /// Postal code in the format of `country`.
    pub postal_code: String,

    /// City name.
    pub city: String,

    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

/// Sanitised data collected by the checkout wizard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckoutFormData {
    /// Step 1 data.
    #[serde(default)]
    pub personal: PersonalInfo,

    /// Step 2 data.
    #[serde(default)]
    pub shipping: ShippingInfo,
}

/// Raw, unsanitised form input as typed by the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckoutDraft {
    /// Step 1 input.
    #[serde(default)]
    pub personal: PersonalInfo,

    /// Step 2 input.
    #[serde(default)]
    pub shipping: ShippingInfo,

    /// Hidden anti-bot field; humans leave it empty.
    #[serde(default)]
    pub honeypot: String,
}

impl CheckoutDraft {
    /// Whether the anti-bot field was filled in.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        !self.honeypot.trim().is_empty()
    }
}

/// Form field, declared in on-screen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// [`PersonalInfo::first_name`]
    FirstName,

    /// [`PersonalInfo::last_name`]
    LastName,

    /// [`PersonalInfo::email`]
    Email,

    /// [`PersonalInfo::phone`]
    Phone,

    /// [`ShippingInfo::address`]
    Address,

    /// [`ShippingInfo::complement`]
    Complement,

    /// [`ShippingInfo::postal_code`]
    PostalCode,

    /// [`ShippingInfo::city`]
    City,

    /// [`ShippingInfo::country`]
    Country,
}

impl Field {
    /// Form field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Complement => "complement",
            Self::PostalCode => "postal_code",
            Self::City => "city",
            Self::Country => "country",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
