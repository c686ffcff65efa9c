//! Redaction of credential-like values before they are written.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Placeholder written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: &[&str] = &[
    "token",
    "password",
    "secret",
    "authorization",
    "api_key",
    "apikey",
    "credential",
    "cookie",
];

/// Redact every field whose key or value looks sensitive.
pub fn redact_fields(fields: HashMap<String, Value>) -> HashMap<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| {
            let value = redact_value(&key, value);
            (key, value)
        })
        .collect()
}

fn redact_value(key: &str, value: Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) if looks_like_sensitive_value(&s) => Value::String(REDACTED.to_string()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = redact_value(&k, v);
                    (k, v)
                })
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| redact_value(key, v)).collect())
        }
        other => other,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    if raw.to_ascii_lowercase().starts_with("bearer ") {
        return true;
    }
    // JWT: header.payload.signature
    if raw.matches('.').count() == 2 && raw.len() > 40 && !raw.contains(' ') {
        return true;
    }
    raw.len() > 48
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '_' | '-'))
}
