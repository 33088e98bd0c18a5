//! Field-access helpers for untyped backend payloads.
//!
//! Every lookup accepts a list of candidate field names so callers can name
//! both the camelCase and snake_case spellings in one place. JSON `null` is
//! treated the same as an absent field.

use serde_json::{Map, Value};

/// Returns the payload as an object map when it is one.
pub fn as_record(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// Returns the payload as an array slice, or an empty slice for any other shape.
pub fn as_array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

/// Looks up the first present, non-null field among `names`.
pub fn field<'a>(record: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| record.get(*name))
        .filter(|value| !value.is_null())
}

/// Looks up a string field among `names`.
pub fn string_field<'a>(record: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .find_map(Value::as_str)
}

/// Looks up an unsigned integer field among `names`.
pub fn u64_field(record: &Map<String, Value>, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .find_map(Value::as_u64)
}

/// Looks up a signed integer field among `names`.
pub fn i64_field(record: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .find_map(Value::as_i64)
}

/// Pretty-prints an arbitrary payload for display fallbacks.
pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_lookup_accepts_either_naming_convention() {
        let camel = json!({ "toolCallId": "call-1" });
        let snake = json!({ "tool_call_id": "call-2" });

        let camel = as_record(&camel).expect("object");
        let snake = as_record(&snake).expect("object");

        let names = ["toolCallId", "tool_call_id"];
        assert_eq!(string_field(camel, &names), Some("call-1"));
        assert_eq!(string_field(snake, &names), Some("call-2"));
    }

    #[test]
    fn null_fields_are_treated_as_absent() {
        let payload = json!({ "title": null, "name": "fallback" });
        let record = as_record(&payload).expect("object");

        assert_eq!(field(record, &["title"]), None);
        assert_eq!(string_field(record, &["title", "name"]), Some("fallback"));
    }

    #[test]
    fn as_array_tolerates_non_arrays() {
        assert!(as_array(&json!("text")).is_empty());
        assert_eq!(as_array(&json!([1, 2])).len(), 2);
    }
}
