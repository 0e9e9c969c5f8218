use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{Result, RowGenError};

/// Default number of downstream calls allowed in flight per batch
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

/// Default per-batch time limit
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(30);

/// One row of input: `[prompt, model]` as untyped JSON values.
///
/// Arity is not checked on decode; a record with the wrong number of
/// elements fails validation in its own call task. A `null` record decodes
/// as an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CallRecord(pub Vec<Value>);

impl CallRecord {
    /// Build a record from any values
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of elements in the record
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// The `(prompt, model)` pair, if the record has exactly two elements
    pub fn as_pair(&self) -> Option<(&Value, &Value)> {
        match self.0.as_slice() {
            [prompt, model] => Some((prompt, model)),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for CallRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self(null_as_default(deserializer)?))
    }
}

impl From<Vec<Value>> for CallRecord {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Inbound batch envelope.
///
/// Caller and session metadata are carried through untouched. The order of
/// `calls` is the contract for reply alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Identifier assigned by the caller
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_id: String,
    /// Resource name of the calling job
    #[serde(default, deserialize_with = "null_as_default")]
    pub caller: String,
    /// User the query runs as
    #[serde(default, deserialize_with = "null_as_default")]
    pub session_user: String,
    /// Static key/value pairs attached to the function definition
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_defined_context: Map<String, Value>,
    /// Call records, one per row
    #[serde(default, deserialize_with = "null_as_default")]
    pub calls: Vec<CallRecord>,
}

impl BatchRequest {
    /// Request carrying only `calls`
    pub fn with_calls(calls: Vec<CallRecord>) -> Self {
        Self {
            calls,
            ..Default::default()
        }
    }

    /// Decode an envelope from raw bytes
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| RowGenError::Envelope(e.to_string()))
    }
}

/// Outbound batch envelope.
///
/// `error_message` is only set when the whole request failed and is left out
/// of the JSON otherwise; per-call failures live inside `replies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// One JSON-encoded reply per call, in call order
    #[serde(default)]
    pub replies: Vec<String>,
    /// Whole-request failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BatchResponse {
    /// Successful response
    pub fn from_replies(replies: Vec<String>) -> Self {
        Self {
            replies,
            error_message: None,
        }
    }

    /// Whole-request failure
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            replies: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

/// Terminal outcome of one call task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Downstream returned a payload
    Succeeded,
    /// Downstream call failed
    Failed,
    /// Record failed validation, no downstream call was made
    Invalid,
    /// Deadline expired before or during the call
    Cancelled,
}

impl CallOutcome {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Succeeded => "succeeded",
            CallOutcome::Failed => "failed",
            CallOutcome::Invalid => "invalid",
            CallOutcome::Cancelled => "cancelled",
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Downstream calls allowed in flight per batch, at least 1
    pub max_concurrency: usize,
    /// Time budget of a whole batch, measured from dispatch
    pub time_limit: Duration,
}

impl DispatchConfig {
    /// Create a config with the default limits
    pub fn new() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    /// Set concurrency limit (number of downstream calls in flight)
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Set the per-batch time limit
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
