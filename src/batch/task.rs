//! Unit of work for one call record
//!
//! A task moves through `Pending → WaitingForPermit → Running → Done`, or
//! leaves `Pending` early when the deadline has already passed or the record
//! is invalid. Whatever happens, it writes exactly one reply into its slot.

use std::sync::Arc;
use tracing::{debug, warn};

use super::reply::{self, ARITY_MESSAGE, CANCELLED_MESSAGE, REQUIRED_MESSAGE};
use super::{CallOutcome, CallRecord, ResultSlot};
use crate::concurrency::{DeadlineGuard, PermitPool};
use crate::downstream::{GenerateError, TextGenerator};

/// A single call record bound to its slot and the batch's shared state
pub struct CallTask {
    record: CallRecord,
    slot: ResultSlot,
    deadline: DeadlineGuard,
    pool: PermitPool,
    client: Arc<dyn TextGenerator>,
}

impl CallTask {
    /// Bind a record to its slot, the batch deadline, the permit pool and the client
    pub fn new(
        record: CallRecord,
        slot: ResultSlot,
        deadline: DeadlineGuard,
        pool: PermitPool,
        client: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            record,
            slot,
            deadline,
            pool,
            client,
        }
    }

    /// Run the call to completion and report how it ended
    pub async fn run(self) -> CallOutcome {
        let CallTask {
            record,
            slot,
            deadline,
            pool,
            client,
        } = self;
        let index = slot.index();

        if deadline.is_expired() {
            debug!(index, "Deadline expired before call started");
            slot.write(reply::error_reply(CANCELLED_MESSAGE));
            return CallOutcome::Cancelled;
        }

        let Some((prompt_value, model_value)) = record.as_pair() else {
            warn!(index, arity = record.arity(), "Call does not have 2 elements");
            slot.write(reply::error_reply(ARITY_MESSAGE));
            return CallOutcome::Invalid;
        };

        debug!(index, "Waiting for permit");
        let Some(permit) = pool.acquire(&deadline).await else {
            debug!(index, "Deadline expired while waiting for permit");
            slot.write(reply::error_reply(CANCELLED_MESSAGE));
            return CallOutcome::Cancelled;
        };

        let prompt = reply::coerce_text(prompt_value);
        let model = reply::coerce_text(model_value);
        if prompt.is_empty() || model.is_empty() {
            warn!(index, "Call is missing prompt or model");
            slot.write(reply::error_reply(REQUIRED_MESSAGE));
            permit.release();
            return CallOutcome::Invalid;
        }

        debug!(index, model = %model, "Processing call");
        let result = client.generate(&prompt, &model, &deadline).await;
        permit.release();

        match result {
            Ok(payload) => {
                slot.write(reply::success_reply(&payload));
                CallOutcome::Succeeded
            }
            Err(GenerateError::Cancelled) => {
                debug!(index, "Deadline expired during downstream call");
                slot.write(reply::error_reply(CANCELLED_MESSAGE));
                CallOutcome::Cancelled
            }
            Err(e) => {
                warn!(index, error = %e, "Error generating text for call");
                slot.write(reply::error_reply(&e.to_string()));
                CallOutcome::Failed
            }
        }
    }
}
