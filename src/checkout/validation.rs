//! Field Validation
//!
//! Each step's input is sanitised first and validated second; on success the sanitised,
//! normalised values are returned so they can be stored as-is.

use std::{collections::BTreeMap, fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::checkout::form::{CheckoutFormData, Field, PersonalInfo, ShippingInfo};

const NAME_MAX_LEN: usize = 50;
const EMAIL_MAX_LEN: usize = 254;
const PHONE_MAX_LEN: usize = 20;
const ADDRESS_MAX_LEN: usize = 200;
const ADDRESS_MIN_LEN: usize = 5;
const CITY_MAX_LEN: usize = 100;
const POSTAL_CODE_MAX_LEN: usize = 10;

struct Patterns {
    name: Regex,
    email: Regex,
    phone: Regex,
    city: Regex,
    country: Regex,
    postal_five_digits: Regex,
    postal_four_digits: Regex,
    postal_generic: Regex,
}

#[expect(clippy::expect_used, reason = "literal patterns, exercised by the tests below")]
static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    name: Regex::new(r"^[\p{L}\p{M}]+(?:[ '’-][\p{L}\p{M}]+)*$").expect("name pattern"),
    email: Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern"),
    phone: Regex::new(r"^\+?[0-9][0-9 ().-]{5,18}[0-9]$").expect("phone pattern"),
    city: Regex::new(r"^[\p{L}\p{M}]+(?:[ '’-][\p{L}\p{M}]+)*$").expect("city pattern"),
    country: Regex::new(r"^[A-Z]{2}$").expect("country pattern"),
    postal_five_digits: Regex::new(r"^[0-9]{5}$").expect("postal pattern"),
    postal_four_digits: Regex::new(r"^[0-9]{4}$").expect("postal pattern"),
    postal_generic: Regex::new(r"^[A-Z0-9][A-Z0-9 -]{1,8}[A-Z0-9]$").expect("postal pattern"),
});

/// Field → message map, ordered like the form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    /// No errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field`, keeping the first message if one exists.
    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    /// Message for `field`.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// First error in form order.
    #[must_use]
    pub fn first(&self) -> Option<(Field, &str)> {
        self.0
            .iter()
            .next()
            .map(|(field, message)| (*field, message.as_str()))
    }

    /// Fields with errors, in form order.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    /// Number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merge(&mut self, other: FieldErrors) {
        for (field, message) in other.0 {
            self.insert(field, message);
        }
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (field, message)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }

            write!(f, "{field}: {message}")?;
        }

        Ok(())
    }
}

/// Strip markup and control characters, collapse whitespace, trim, and cap at `max_len` chars.
#[must_use]
pub fn sanitize(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_len)
        .collect()
}

/// Validate step 1 input.
///
/// # Errors
///
/// Returns every failing field with its message.
pub fn validate_personal(input: &PersonalInfo) -> Result<PersonalInfo, FieldErrors> {
    let patterns = &*PATTERNS;
    let mut errors = FieldErrors::new();

    let first_name = sanitize(&input.first_name, NAME_MAX_LEN);
    let last_name = sanitize(&input.last_name, NAME_MAX_LEN);
    let email = sanitize(&input.email, EMAIL_MAX_LEN).to_lowercase();
    let phone = sanitize(&input.phone, PHONE_MAX_LEN);

    for (field, value, label) in [
        (Field::FirstName, &first_name, "First name"),
        (Field::LastName, &last_name, "Last name"),
    ] {
        if value.is_empty() {
            errors.insert(field, format!("{label} is required"));
        } else if value.chars().count() < 2 || !patterns.name.is_match(value) {
            errors.insert(
                field,
                format!("{label} must be at least 2 letters (hyphens and apostrophes allowed)"),
            );
        }
    }

    if email.is_empty() {
        errors.insert(Field::Email, "Email is required");
    } else if !patterns.email.is_match(&email) {
        errors.insert(Field::Email, "Email address is not valid");
    }

    if !phone.is_empty() && !patterns.phone.is_match(&phone) {
        errors.insert(Field::Phone, "Phone number is not valid");
    }

    errors.into_result(PersonalInfo {
        first_name,
        last_name,
        email,
        phone,
    })
}

/// Validate step 2 input.
///
/// # Errors
///
/// Returns every failing field with its message.
pub fn validate_shipping(input: &ShippingInfo) -> Result<ShippingInfo, FieldErrors> {
    let patterns = &*PATTERNS;
    let mut errors = FieldErrors::new();

    let address = sanitize(&input.address, ADDRESS_MAX_LEN);
    let complement = sanitize(&input.complement, ADDRESS_MAX_LEN);
    let city = sanitize(&input.city, CITY_MAX_LEN);
    let country = sanitize(&input.country, 3).to_uppercase();
    let postal_code = normalize_postal_code(&input.postal_code, &country);

    if address.is_empty() {
        errors.insert(Field::Address, "Address is required");
    } else if address.chars().count() < ADDRESS_MIN_LEN {
        errors.insert(
            Field::Address,
            format!("Address must be at least {ADDRESS_MIN_LEN} characters"),
        );
    }

    if country.is_empty() {
        errors.insert(Field::Country, "Country is required");
    } else if !patterns.country.is_match(&country) {
        errors.insert(Field::Country, "Country is not valid");
    }

    if postal_code.is_empty() {
        errors.insert(Field::PostalCode, "Postal code is required");
    } else if !postal_code_matches(&postal_code, &country) {
        errors.insert(
            Field::PostalCode,
            "Postal code is not valid for the selected country",
        );
    }

    if city.is_empty() {
        errors.insert(Field::City, "City is required");
    } else if !patterns.city.is_match(&city) {
        errors.insert(Field::City, "City may only contain letters");
    }

    errors.into_result(ShippingInfo {
        address,
        complement,
        postal_code,
        city,
        country,
    })
}

/// Validate everything collected so far, as done again right before payment.
///
/// # Errors
///
/// Returns the failing fields of both steps.
pub fn validate_all(form: &CheckoutFormData) -> Result<CheckoutFormData, FieldErrors> {
    let personal = validate_personal(&form.personal);
    let shipping = validate_shipping(&form.shipping);

    match (personal, shipping) {
        (Ok(personal), Ok(shipping)) => Ok(CheckoutFormData { personal, shipping }),
        (personal, shipping) => {
            let mut errors = FieldErrors::new();

            if let Err(personal) = personal {
                errors.merge(personal);
            }

            if let Err(shipping) = shipping {
                errors.merge(shipping);
            }

            Err(errors)
        }
    }
}

fn normalize_postal_code(input: &str, country: &str) -> String {
    let code = sanitize(input, POSTAL_CODE_MAX_LEN + 2).to_uppercase();

    match country {
        "FR" | "BE" | "LU" | "CH" | "DE" | "MC" => code.replace([' ', '-'], ""),
        _ => code,
    }
}

fn postal_code_matches(code: &str, country: &str) -> bool {
    let patterns = &*PATTERNS;

    match country {
        "FR" | "DE" | "MC" => patterns.postal_five_digits.is_match(code),
        "BE" | "LU" | "CH" => patterns.postal_four_digits.is_match(code),
        _ => patterns.postal_generic.is_match(code),
    }
}
