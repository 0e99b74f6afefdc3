//! # Anti-Leakage Padding
//!
//! Quantizes the serialized size of every encrypted contract message to a
//! multiple of `block_size`, so ciphertext length leaks as little as
//! possible about which call was made.
//!
//! The padding field is injected into the object under the message's
//! *first* top-level key, matching the envelope convention of the target
//! contracts (`{"action": {...}}`).

use serde_json::Value;

use crate::domain::RelayerError;

/// Key of the injected padding field.
pub const PADDING_KEY: &str = "p";

/// Pad a message so its compact JSON serialization fills a whole block.
///
/// Returns the message unchanged when it already fills a block, when the
/// gap is smaller than `min_padding` or than the field itself, or when the
/// first top-level value is not an object. A padded message never crosses
/// into the next block.
pub fn pad_message(msg: Value, block_size: usize, min_padding: usize) -> Result<Value, RelayerError> {
    if block_size == 0 {
        return Ok(msg);
    }

    let len = serde_json::to_vec(&msg)?.len();
    let remainder = len % block_size;
    if remainder == 0 {
        return Ok(msg);
    }

    let missing = block_size - remainder;
    if missing < min_padding {
        return Ok(msg);
    }

    let mut envelope = match msg {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    if let Some(Value::Object(inner)) = envelope.values_mut().next() {
        if inner.contains_key(PADDING_KEY) {
            return Ok(Value::Object(envelope));
        }
        // `"p":""` costs 6 bytes, plus a separating comma when the object has fields.
        let overhead = PADDING_KEY.len() + 5 + usize::from(!inner.is_empty());
        if missing < overhead {
            return Ok(Value::Object(envelope));
        }
        inner.insert(
            PADDING_KEY.to_string(),
            Value::String(" ".repeat(missing - overhead)),
        );
    }

    Ok(Value::Object(envelope))
}
