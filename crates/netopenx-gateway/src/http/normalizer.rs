//! Response envelope normalization
//!
//! The backend is inconsistent about how it wraps payloads: list endpoints
//! usually answer `{"Data": [...]}`, some answer a bare array, and a few
//! wrap under `items` or `value`. Detail endpoints wrap a single object the
//! same way. Callers should never have to care, so the client runs every
//! parsed body through a single ordered unwrap pass.

use serde_json::Value;

/// Envelope keys the backend is known to use, in priority order.
const ENVELOPE_KEYS: &[&str] = &["Data", "items", "value"];

/// Unwrap a known envelope, or pass the value through unchanged.
///
/// Only the outermost layer is unwrapped; the payload under an envelope key
/// is returned verbatim whatever its kind (array, object, scalar).
pub fn normalize_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for key in ENVELOPE_KEYS {
                if let Some(inner) = map.remove(*key) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}
