//! Guard against embedding binary payloads in the manifest.

/// Strings at least this long made only of base64 characters are treated as
/// encoded binary data.
const BASE64_RUN_THRESHOLD: usize = 512;

/// Whether a value is (or contains) an embedded binary payload: a `data:` URI
/// or a long base64 run. URLs and short strings are never payloads.
pub fn is_binary_payload(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::String(s) => is_binary_string(s),
    serde_json::Value::Array(items) => items.iter().any(is_binary_payload),
    serde_json::Value::Object(map) => map.values().any(is_binary_payload),
    _ => false,
  }
}

fn is_binary_string(s: &str) -> bool {
  if s.starts_with("data:") && s.contains(";base64,") {
    return true;
  }

  s.len() >= BASE64_RUN_THRESHOLD
    && s
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_'))
}
