//! Per-call reply encoding
//!
//! Every reply is a JSON document in string form: either the downstream
//! success payload or `{"error": "<message>"}`.

use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tracing::error;

/// Reply message for calls cut off by the batch deadline
pub const CANCELLED_MESSAGE: &str = "Request cancelled";

/// Reply message for records without exactly two elements
pub const ARITY_MESSAGE: &str = "Invalid input: expected 2 elements";

/// Reply message for records with an empty prompt or model
pub const REQUIRED_MESSAGE: &str = "Invalid input: PromptInput and Model are required";

/// Encode an error reply
pub fn error_reply(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Encode a downstream success payload, keeping its exact text
pub fn success_reply(payload: &RawValue) -> String {
    payload.get().to_owned()
}

/// Encode any serializable value as a reply, degrading to an error reply
pub fn encode_reply<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(error = %e, "Error marshaling reply to JSON");
            error_reply(&e.to_string())
        }
    }
}

/// Text form of an untyped call argument.
///
/// Strings are used as-is, `null` becomes empty, everything else uses its
/// compact JSON form.
pub fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
