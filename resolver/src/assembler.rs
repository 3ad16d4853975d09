//! Normalizes the payloads returned by the legislative-data API into a single
//! `PersonRecord` shape.
//!
//! The upstream is inconsistent: some operations return a single object, some
//! an array of candidates, and the name may be spread across several fields.
//! All of that is absorbed here so the pipeline only ever sees `PersonRecord`.
use crate::types::PersonRecord;
use serde_json::{Map, Value};

/// Full-name fields, in order of preference.
const FULL_NAME_FIELDS: &[&str] = &["full_name", "name"];

/// Pairs of name parts, tried in order when no full-name field is present.
const NAME_PART_FIELDS: &[(&str, &str)] = &[
    ("given_name", "family_name"),
    ("first_name", "last_name"),
];

/// Normalizes an upstream payload.
///
/// An array is treated as a list of candidates and the first one is used. A
/// plain object is the single candidate. Anything else yields an empty record.
pub fn normalize(raw: &Value) -> PersonRecord {
    let Some(fields) = candidate(raw) else {
        return PersonRecord::default();
    };

    PersonRecord {
        name: resolve_name(fields),
        party: text(fields, "party"),
        constituency: text(fields, "constituency"),
        email: text(fields, "email"),
        person_id: text(fields, "person_id").or_else(|| text(fields, "id")),
    }
}

/// Returns the message when the upstream explicitly reports an error in its
/// body (e.g. `{"error": "Unknown postcode"}`) instead of a record.
pub fn signalled_error(raw: &Value) -> Option<String> {
    match raw.as_object()?.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn candidate(raw: &Value) -> Option<&Map<String, Value>> {
    match raw {
        Value::Array(items) => items.first()?.as_object(),
        Value::Object(fields) => Some(fields),
        _ => None,
    }
}

fn resolve_name(fields: &Map<String, Value>) -> Option<String> {
    FULL_NAME_FIELDS
        .iter()
        .find_map(|key| text(fields, key))
        .or_else(|| {
            NAME_PART_FIELDS
                .iter()
                .find_map(|&(first, last)| join_parts(fields, &[first, last]))
        })
}

fn join_parts(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let parts: Vec<String> = keys.iter().filter_map(|key| text(fields, key)).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

// Upstream ids arrive as either strings or integers. Blank strings are absent.
fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_name_wins() {
        let record = normalize(&json!({
            "full_name": "Jane Doe",
            "name": "J. Doe",
            "given_name": "Janet",
            "family_name": "Doe",
        }));
        assert_eq!(record.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_name_from_parts() {
        let record = normalize(&json!({"given_name": "Jane", "family_name": "Doe"}));
        assert_eq!(record.name.as_deref(), Some("Jane Doe"));

        // Empty parts are skipped rather than producing stray spaces
        let record = normalize(&json!({"given_name": "", "family_name": "Doe"}));
        assert_eq!(record.name.as_deref(), Some("Doe"));

        let record = normalize(&json!({"first_name": "John", "last_name": "Smith"}));
        assert_eq!(record.name.as_deref(), Some("John Smith"));

        // A blank full name falls through to the parts
        let record = normalize(&json!({"name": "  ", "first_name": "John"}));
        assert_eq!(record.name.as_deref(), Some("John"));

        let record = normalize(&json!({"party": "Labour"}));
        assert_eq!(record.name, None);
    }

    #[test]
    fn test_person_id_fallback() {
        let record = normalize(&json!({"person_id": "123", "id": "999"}));
        assert_eq!(record.person_id.as_deref(), Some("123"));

        let record = normalize(&json!({"id": 25040}));
        assert_eq!(record.person_id.as_deref(), Some("25040"));

        let record = normalize(&json!({"name": "Jane Doe"}));
        assert_eq!(record.person_id, None);
    }

    #[test]
    fn test_array_takes_first_candidate() {
        let record = normalize(&json!([
            {"full_name": "First Member", "constituency": "Test Seat", "party": "Green"},
            {"full_name": "Second Member"},
        ]));
        assert_eq!(record.name.as_deref(), Some("First Member"));
        assert_eq!(record.constituency.as_deref(), Some("Test Seat"));
        assert_eq!(record.party.as_deref(), Some("Green"));

        assert_eq!(normalize(&json!([])), PersonRecord::default());
        assert_eq!(normalize(&json!("not a record")), PersonRecord::default());
        assert_eq!(normalize(&Value::Null), PersonRecord::default());
    }

    #[test]
    fn test_signalled_error() {
        assert_eq!(
            signalled_error(&json!({"error": "Unknown postcode"})),
            Some("Unknown postcode".to_string())
        );
        assert_eq!(signalled_error(&json!({"error": null, "name": "x"})), None);
        assert_eq!(signalled_error(&json!({"name": "x"})), None);
        assert_eq!(signalled_error(&json!([{"error": "ignored"}])), None);
    }
}
