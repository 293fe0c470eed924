//! Change detection between observed and declared state.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::resolver::reference_id;

/// Tracked fields whose declared value differs from the observed one.
///
/// Only fields present in `declared` are compared, so unspecified fields
/// never cause an update. Fields listed in `references` carry the canonical
/// UUID form of the declared value; the observed side is reduced to UUIDs
/// before comparing. Lists compare without regard to order.
pub fn detect_changes(
    observed: &Value,
    declared: &Map<String, Value>,
    tracked: &[String],
    references: &BTreeMap<String, Value>,
) -> Vec<String> {
    tracked
        .iter()
        .filter(|field| {
            let Some(want) = declared.get(field.as_str()).filter(|v| !v.is_null()) else {
                return false;
            };
            let have = observed.get(field.as_str()).unwrap_or(&Value::Null);
            match references.get(field.as_str()) {
                Some(canonical) => normalize(&reference_id(have)) != normalize(canonical),
                None => normalize(have) != normalize(want),
            }
        })
        .cloned()
        .collect()
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(normalize).collect();
            items.sort_by_cached_key(|v| v.to_string());
            Value::Array(items)
        }
        other => other.clone(),
    }
}
