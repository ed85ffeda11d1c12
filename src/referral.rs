use serde_json::Value;

use crate::crm::{CustomField, CustomFieldUpdate};

pub const REFERRAL_FIELD_KEY: &str = "referral_count";

/// Current referral count stored on a contact.
///
/// The first field whose `key` or `id` is exactly `referral_count` wins.
/// A missing field or a value that is not an integer counts as zero.
pub fn current_count(fields: &[CustomField]) -> i64 {
    fields
        .iter()
        .find(|f| {
            f.key.as_deref() == Some(REFERRAL_FIELD_KEY)
                || f.id.as_deref() == Some(REFERRAL_FIELD_KEY)
        })
        .and_then(|f| f.value.as_ref())
        .map(parse_count)
        .unwrap_or(0)
}

fn parse_count(value: &Value) -> i64 {
    match value {
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

pub fn next_count(current: i64) -> i64 {
    current.saturating_add(1)
}

/// The single-field write that stores `count`.
pub fn count_update(count: i64) -> CustomFieldUpdate {
    CustomFieldUpdate {
        key: REFERRAL_FIELD_KEY.to_string(),
        field_value: count.to_string(),
    }
}
