//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rowgen::batch::CallRecord;
use rowgen::concurrency::DeadlineGuard;
use rowgen::downstream::{GenerateError, Payload, TextGenerator};
use serde_json::json;
use serde_json::value::RawValue;

/// How long the fake backend takes per call
#[derive(Debug, Clone, Copy)]
pub enum Latency {
    None,
    Fixed(Duration),
    /// Uniformly random up to the given number of milliseconds
    RandomUpTo(u64),
}

/// Fake backend that echoes prompt and model back as the payload.
///
/// Prompts equal to `"fail"` produce a transport error. It tracks how many
/// calls are running at once so tests can check the permit bound.
pub struct EchoClient {
    latency: Latency,
    observe_deadline: bool,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl EchoClient {
    pub fn new(latency: Latency) -> Self {
        Self {
            latency,
            observe_deadline: true,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    /// A backend that keeps going after the deadline fires
    pub fn ignoring_deadline(latency: Latency) -> Self {
        Self {
            observe_deadline: false,
            ..Self::new(latency)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    fn delay(&self) -> Duration {
        match self.latency {
            Latency::None => Duration::ZERO,
            Latency::Fixed(d) => d,
            Latency::RandomUpTo(ms) => Duration::from_millis(rand::thread_rng().gen_range(0..=ms)),
        }
    }
}

#[async_trait]
impl TextGenerator for EchoClient {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        deadline: &DeadlineGuard,
    ) -> Result<Payload, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay();
        let finished = if self.observe_deadline {
            tokio::select! {
                _ = deadline.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            }
        } else {
            tokio::time::sleep(delay).await;
            true
        };

        self.running.fetch_sub(1, Ordering::SeqCst);

        if !finished {
            return Err(GenerateError::Cancelled);
        }
        if prompt == "fail" {
            return Err(GenerateError::Transport("connection refused".to_string()));
        }
        RawValue::from_string(expected_reply(prompt, model))
            .map_err(|e| GenerateError::InvalidPayload(e.to_string()))
    }
}

/// Body the echo backend returns for a call, which is also the exact reply
/// the dispatcher must write for it. Keys are not in sorted order.
pub fn expected_reply(prompt: &str, model: &str) -> String {
    format!(
        r#"{{"model":{},"response":{},"done":true,"eval_count":1.0e1}}"#,
        json!(model),
        json!(format!("echo: {prompt}"))
    )
}

/// A well-formed `[prompt, model]` record
pub fn call(prompt: &str, model: &str) -> CallRecord {
    CallRecord::new(vec![json!(prompt), json!(model)])
}
