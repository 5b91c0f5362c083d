//! Identity and argument filtering of connection results

use crate::store::{Entity, TypeBucket};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Entities referenced by `ids`, in relation order
///
/// Identifiers with no stored entity are skipped.
pub fn filter_by_identity<'s>(bucket: Option<&'s TypeBucket>, ids: &[&str]) -> Vec<&'s Entity> {
    let Some(bucket) = bucket else {
        return Vec::new();
    };
    ids.iter().filter_map(|id| bucket.get(*id)).collect()
}

/// Apply `condition` and `filter` arguments
pub fn filter_by_args<'s>(entities: Vec<&'s Entity>, args: &Map<String, Value>) -> Vec<&'s Entity> {
    let condition = args.get("condition").and_then(Value::as_object);
    let filter = args.get("filter").and_then(Value::as_object);

    entities
        .into_iter()
        .filter(|entity| condition.map_or(true, |c| matches_condition(entity, c)))
        .filter(|entity| filter.map_or(true, |f| matches_filter(entity, f)))
        .collect()
}

fn matches_condition(entity: &Entity, condition: &Map<String, Value>) -> bool {
    condition
        .iter()
        .all(|(field, expected)| entity.get(field) == Some(expected))
}

/// Fields absent or falsy on the entity are not constrained
fn matches_filter(entity: &Entity, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(field, comparators)| match entity.get(field) {
        Some(value) if is_truthy(value) => check_comparators(comparators, value),
        _ => true,
    })
}

fn check_comparators(comparators: &Value, value: &Value) -> bool {
    let Some(comparators) = comparators.as_object() else {
        return true;
    };
    comparators.iter().all(|(key, bound)| {
        let ordering = match (parse_timestamp(bound), parse_timestamp(value)) {
            (Some(bound), Some(value)) => bound.cmp(&value),
            _ => return !is_comparator(key),
        };
        match key.as_str() {
            "lessThanOrEqualTo" => ordering.is_le(),
            "greaterThanOrEqualTo" => ordering.is_ge(),
            _ => true,
        }
    })
}

fn is_comparator(key: &str) -> bool {
    matches!(key, "lessThanOrEqualTo" | "greaterThanOrEqualTo")
}

/// Milliseconds since the epoch
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC), `YYYY-MM-DD`, or an
/// integer number of milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(millis) => millis.as_i64(),
        Value::String(text) => parse_timestamp_str(text),
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
