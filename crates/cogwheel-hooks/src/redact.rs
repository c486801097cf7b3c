//! Sensitive-data redaction for logged values.

use serde_json::Value;

/// Default truncation limit for long strings.
pub const DEFAULT_REDACT_MAX_LEN: usize = 500;

/// Key substrings whose values are replaced wholesale.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "api_key",
    "apikey",
    "api-key",
    "token",
    "auth",
    "authorization",
    "private_key",
    "privatekey",
    "private-key",
    "access_token",
    "refresh_token",
    "session",
    "cookie",
    "credential",
    "credentials",
];

const PLACEHOLDER: &str = "***REDACTED***";

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let prefix: String = s.chars().take(max_len).collect();
        format!("{prefix}... (truncated)")
    } else {
        s.to_string()
    }
}

/// Redact sensitive map entries and truncate long strings.
///
/// Recurses into objects and arrays; matching is case-insensitive substring
/// containment on map keys. `max_len` of zero falls back to
/// [`DEFAULT_REDACT_MAX_LEN`].
pub fn redact(value: &Value, max_len: usize) -> Value {
    let max_len = if max_len == 0 {
        DEFAULT_REDACT_MAX_LEN
    } else {
        max_len
    };
    redact_inner(value, max_len)
}

fn redact_inner(value: &Value, max_len: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate(s, max_len)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact_inner(v, max_len)).collect())
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                if is_sensitive(key) {
                    out.insert(key.clone(), Value::String(PLACEHOLDER.into()));
                } else {
                    out.insert(key.clone(), redact_inner(v, max_len));
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
