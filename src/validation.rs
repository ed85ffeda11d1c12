use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

pub const CONTACT_ID_PARAM: &str = "contactId";
pub const CONTACT_ID_MAX_LEN: usize = 50;

lazy_static! {
    /// Characters allowed in a contact identifier
    /// - Valid: "abc123", "contact_01", "A-b-C"
    /// - Invalid: "has space", "a/b", "id.with.dots"
    pub static ref CONTACT_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// One rejected request parameter, returned to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub msg: String,
    pub param: String,
    pub location: &'static str,
}

impl FieldError {
    fn contact_id(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
            param: CONTACT_ID_PARAM.to_string(),
            location: "query",
        }
    }
}

/// Checks the `contactId` query parameter.
///
/// Every rule runs, so an empty value reports all three violations.
pub fn validate_contact_id(contact_id: Option<&str>) -> Vec<FieldError> {
    let value = contact_id.unwrap_or_default();
    let mut errors = Vec::new();

    if value.is_empty() {
        errors.push(FieldError::contact_id("contactId is required"));
    }

    let len = value.chars().count();
    if !(1..=CONTACT_ID_MAX_LEN).contains(&len) {
        errors.push(FieldError::contact_id(
            "contactId must be between 1 and 50 characters",
        ));
    }

    if !CONTACT_ID_REGEX.is_match(value) {
        errors.push(FieldError::contact_id(
            "contactId contains invalid characters",
        ));
    }

    errors
}

/// Checks every `contactId` found in the query string. Repeating the
/// parameter is itself an error; the first value still gets the usual rules.
pub fn validate_contact_ids(values: &[String]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if values.len() > 1 {
        errors.push(FieldError::contact_id("contactId must be provided once"));
    }
    errors.extend(validate_contact_id(values.first().map(String::as_str)));
    errors
}
