/// Batch dispatcher and its per-outcome summary
pub mod executor;
/// Reply encoding and the fixed reply messages
pub mod reply;
/// Write-once result slots
pub mod slots;
/// Per-call task
pub mod task;
/// Wire envelopes and dispatch configuration
pub mod types;

pub use executor::*;
pub use slots::*;
pub use task::*;
pub use types::*;
