//! Shared structures connecting detail workers to the coordinator: the work queue with its
//! join barrier and the append-only result, error and dead-letter collections.

pub mod collection;
pub mod work_queue;

pub use collection::{ResultCollection, SharedLog};
pub use work_queue::{TaskGuard, WorkQueue};
