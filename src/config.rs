//! Environment-driven settings
//!
//! Settings are read once at startup and handed to the dispatcher and the
//! server explicitly. Bad values fall back to the defaults with a warning.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::batch::{DispatchConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIME_LIMIT};

const ENV_CONCURRENCY_LIMIT: &str = "CONCURRENCY_LIMIT";
const ENV_CONTEXT_TIMEOUT_S: &str = "CONTEXT_TIMEOUT_S";
const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
const ENV_PORT: &str = "PORT";

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 8080;

/// Service settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Permits per batch
    pub concurrency_limit: usize,
    /// Per-batch time limit in seconds
    pub context_timeout_secs: u64,
    /// Base URL of the Ollama server
    pub ollama_url: String,
    /// Listen port
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_MAX_CONCURRENCY,
            context_timeout_secs: DEFAULT_TIME_LIMIT.as_secs(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let settings = Self {
            concurrency_limit: positive(&lookup, ENV_CONCURRENCY_LIMIT, defaults.concurrency_limit),
            context_timeout_secs: positive(
                &lookup,
                ENV_CONTEXT_TIMEOUT_S,
                defaults.context_timeout_secs,
            ),
            ollama_url: lookup(ENV_OLLAMA_URL)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.ollama_url),
            port: positive(&lookup, ENV_PORT, defaults.port),
        };

        info!(
            concurrency_limit = settings.concurrency_limit,
            context_timeout_secs = settings.context_timeout_secs,
            ollama_url = %settings.ollama_url,
            port = settings.port,
            "Loaded settings"
        );
        settings
    }

    /// Per-batch time limit
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.context_timeout_secs)
    }

    /// Limits handed to the dispatcher
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new()
            .with_concurrency_limit(self.concurrency_limit)
            .with_time_limit(self.time_limit())
    }
}

/// Parse a strictly positive number, falling back to `default`
fn positive<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + Display + Copy,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        Ok(value) => {
            warn!(key, %value, %default, "Value must be positive, using default");
            default
        }
        Err(e) => {
            warn!(key, raw = %raw, %default, error = %e, "Failed to parse value, using default");
            default
        }
    }
}
