//! Text-generation client seam
//!
//! Call tasks only see the [`TextGenerator`] trait. The success payload is the
//! downstream body as raw JSON text, written into the reply byte for byte;
//! failures carry a message that is embedded into the reply's error object.

use async_trait::async_trait;
use serde_json::value::RawValue;
use thiserror::Error;

use crate::concurrency::DeadlineGuard;

pub mod ollama;

pub use ollama::{GenerateRequest, OllamaClient};

/// Errors related to downstream generation calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// The base URL could not be turned into an endpoint
    #[error("invalid downstream url: {0}")]
    InvalidUrl(String),

    /// Connection or I/O failure
    #[error("error making request: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("downstream returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Trimmed response body
        body: String,
    },

    /// Response body was not JSON
    #[error("invalid downstream payload: {0}")]
    InvalidPayload(String),

    /// The batch deadline fired first
    #[error("Request cancelled")]
    Cancelled,
}

/// Downstream success body, checked to be JSON but otherwise untouched
pub type Payload = Box<RawValue>;

/// Trait for single-item text-generation backends
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` with `model`.
    ///
    /// Implementations should stop waiting once `deadline` expires and
    /// return [`GenerateError::Cancelled`].
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        deadline: &DeadlineGuard,
    ) -> Result<Payload, GenerateError>;
}
