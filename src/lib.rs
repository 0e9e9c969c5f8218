//! # rowgen
//!
//! A remote-function gateway for analytical query engines. A query engine
//! pushes a batch of row-level calls to the service, every row is turned into
//! one request against a single-item text-generation service, and the replies
//! come back in the same order as the rows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rowgen::batch::{BatchDispatcher, BatchRequest, DispatchConfig};
//! use rowgen::downstream::OllamaClient;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rowgen::Result<()> {
//! let client = Arc::new(OllamaClient::new("http://localhost:11434")?);
//! let dispatcher = BatchDispatcher::new(client, DispatchConfig::default());
//!
//! let request: BatchRequest = serde_json::from_value(json!({
//!     "requestId": "req-1",
//!     "calls": [["Why is the sky blue?", "llama3"]]
//! }))?;
//!
//! let response = dispatcher.dispatch(request, CancellationToken::new()).await;
//! assert_eq!(response.replies.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: request/response model, result slots, per-call tasks and the dispatcher
//! - [`concurrency`]: the permit pool and the shared deadline guard
//! - [`downstream`]: the text-generation client seam and its Ollama implementation
//! - [`server`]: the HTTP surface
//! - [`config`]: environment-driven settings
//! - [`metrics`]: Prometheus counters for dispatched batches and calls
//! - [`telemetry`]: tracing subscriber setup

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for rowgen operations
pub type Result<T> = std::result::Result<T, RowGenError>;

/// Main error type for rowgen operations
#[derive(Error, Debug)]
pub enum RowGenError {
    /// The inbound batch envelope could not be decoded
    #[error("{0}")]
    Envelope(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Downstream text-generation errors
    #[error("Downstream error: {0}")]
    Downstream(#[from] downstream::GenerateError),

    /// Join error from async tasks
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// I/O error while binding or serving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Batch model, result slots, tasks and the dispatcher
pub mod batch;

/// Permit pool and deadline guard
pub mod concurrency;

/// Text-generation client seam
pub mod downstream;

/// HTTP surface
pub mod server;

/// Environment-driven settings
pub mod config;

/// Prometheus metrics
pub mod metrics;

/// Tracing subscriber setup
pub mod telemetry;
