//! Concurrency primitives shared by the call tasks of one batch

pub mod deadline;
pub mod permit_pool;

pub use deadline::DeadlineGuard;
pub use permit_pool::{Permit, PermitPool};
