use regex::Regex;
use std::sync::LazyLock;

use crate::error::ValidationError;

/// Dialing prefixes offered when registering a client
pub const COUNTRY_CODES: [(&str, &str); 10] = [
    ("+55", "Brazil"),
    ("+1", "USA/Canada"),
    ("+351", "Portugal"),
    ("+34", "Spain"),
    ("+44", "United Kingdom"),
    ("+33", "France"),
    ("+49", "Germany"),
    ("+39", "Italy"),
    ("+54", "Argentina"),
    ("+52", "Mexico"),
];

static BR_LANDLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})(\d{4})(\d{0,4})").expect("valid regex"));
static BR_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})(\d{5})(\d{0,4})").expect("valid regex"));
static NANP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{3})(\d{3})(\d{0,4})").expect("valid regex"));
static GENERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,3})(\d{3,4})(\d{0,4})").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

pub fn is_known_country_code(code: &str) -> bool {
    COUNTRY_CODES.iter().any(|(c, _)| *c == code)
}

/// Apply the display mask for `country_code` to whatever digits `value` contains.
///
/// Only the first mask match is rewritten: too few digits leaves the bare
/// digits, extra digits trail after the mask.
pub fn format_phone_number(value: &str, country_code: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();

    match country_code {
        "+55" if digits.len() <= 10 => BR_LANDLINE.replace(&digits, "(${1}) ${2}-${3}").into_owned(),
        "+55" => BR_MOBILE.replace(&digits, "(${1}) ${2}-${3}").into_owned(),
        "+1" => NANP.replace(&digits, "(${1}) ${2}-${3}").into_owned(),
        _ => GENERIC.replace(&digits, "${1} ${2}-${3}").into_owned(),
    }
}

/// Empty input is accepted since email is optional
pub fn is_valid_email(email: &str) -> bool {
    email.is_empty() || EMAIL.is_match(email)
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}
