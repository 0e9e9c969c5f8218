//! Batch Dispatcher Implementation
//!
//! Fans a batch of call records out to the text-generation client:
//! - One spawned task per call record
//! - Semaphore-based limit on downstream calls in flight
//! - A single deadline shared by every task of the batch
//! - Full join before the replies are read back in input order

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::reply::{self, CANCELLED_MESSAGE};
use super::{BatchRequest, BatchResponse, CallOutcome, CallTask, DispatchConfig, ResultSlots};
use crate::concurrency::{DeadlineGuard, PermitPool};
use crate::downstream::TextGenerator;
use crate::metrics;

/// Per-outcome counters for one batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Calls that got a payload back
    pub succeeded: usize,
    /// Calls whose downstream request failed
    pub failed: usize,
    /// Calls rejected by validation
    pub invalid: usize,
    /// Calls cut short by the deadline
    pub cancelled: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Succeeded => self.succeeded += 1,
            CallOutcome::Failed => self.failed += 1,
            CallOutcome::Invalid => self.invalid += 1,
            CallOutcome::Cancelled => self.cancelled += 1,
        }
        metrics::record_call(outcome.as_str());
    }

    /// Total number of calls accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.invalid + self.cancelled
    }
}

/// Dispatcher for batches of call records
pub struct BatchDispatcher {
    /// Downstream text-generation client shared by all tasks
    client: Arc<dyn TextGenerator>,
    /// Concurrency limit and time limit applied to every batch
    config: DispatchConfig,
}

impl BatchDispatcher {
    /// Create a new dispatcher
    pub fn new(client: Arc<dyn TextGenerator>, config: DispatchConfig) -> Self {
        Self { client, config }
    }

    /// The limits applied to every batch
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch every call of `request` and return one reply per call, in order.
    ///
    /// The batch deadline starts now and also expires when `cancel` fires.
    /// Per-call problems never fail the batch; they end up in that call's reply.
    pub async fn dispatch(&self, request: BatchRequest, cancel: CancellationToken) -> BatchResponse {
        self.dispatch_with_summary(request, cancel).await.0
    }

    /// Like [`dispatch`](Self::dispatch), also returning per-outcome counts
    #[instrument(
        skip(self, request, cancel),
        fields(request_id = %request.request_id, call_count = request.calls.len())
    )]
    pub async fn dispatch_with_summary(
        &self,
        request: BatchRequest,
        cancel: CancellationToken,
    ) -> (BatchResponse, BatchSummary) {
        let batch_start = Instant::now();
        let calls = request.calls;
        let total_calls = calls.len();
        let mut summary = BatchSummary::default();

        if calls.is_empty() {
            info!("No calls to dispatch in batch");
            metrics::record_batch(batch_start.elapsed().as_secs_f64());
            return (BatchResponse::from_replies(Vec::new()), summary);
        }

        info!(
            total_calls,
            max_concurrency = self.config.max_concurrency,
            time_limit_ms = self.config.time_limit.as_millis() as u64,
            "Starting batch dispatch"
        );

        let deadline = DeadlineGuard::new(self.config.time_limit, &cancel);
        let pool = PermitPool::new(self.config.max_concurrency);
        let (slots, handles) = ResultSlots::with_handles(total_calls);

        let mut spawned = Vec::with_capacity(total_calls);
        for (record, slot) in calls.into_iter().zip(handles) {
            let index = slot.index();

            // Don't start work once the deadline is gone
            if deadline.is_expired() {
                debug!(index, "Deadline expired before spawning call");
                slot.write(reply::error_reply(CANCELLED_MESSAGE));
                summary.record(CallOutcome::Cancelled);
                continue;
            }

            let task = CallTask::new(
                record,
                slot,
                deadline.clone(),
                pool.clone(),
                Arc::clone(&self.client),
            );
            spawned.push((index, tokio::spawn(task.run())));
        }

        let (indices, tasks): (Vec<_>, Vec<_>) = spawned.into_iter().unzip();
        let results = join_all(tasks).await;

        for (index, result) in indices.into_iter().zip(results) {
            match result {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(index, error = %e, "Call task join error");
                    slots.fill_if_empty(index, reply::error_reply(&format!("Task join error: {e}")));
                    summary.record(CallOutcome::Failed);
                }
            }
        }

        let replies = slots.into_replies(|index| {
            error!(index, "Call produced no reply");
            reply::error_reply("Call produced no reply")
        });

        let batch_duration = batch_start.elapsed();
        metrics::record_batch(batch_duration.as_secs_f64());

        info!(
            total_calls,
            succeeded = summary.succeeded,
            failed = summary.failed,
            invalid = summary.invalid,
            cancelled = summary.cancelled,
            peak_in_flight = pool.peak(),
            batch_duration_ms = batch_duration.as_millis() as u64,
            "Batch dispatch completed"
        );

        if deadline.is_expired() && summary.cancelled > 0 {
            warn!(
                cancelled = summary.cancelled,
                "Batch deadline expired before all calls finished"
            );
        }

        (BatchResponse::from_replies(replies), summary)
    }
}
