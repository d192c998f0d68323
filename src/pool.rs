//! Worker-pool stage: shard-bound workers pulling work items from a shared
//! queue, with per-worker backoff, requeue-based retries and a coordinator
//! that reports progress and waits on the queue's join barrier.

pub mod backoff;
pub mod fetcher;
mod lifecycle;
mod worker;
mod worker_pool;

pub use backoff::BackoffState;
pub use fetcher::{FetchReport, ItemFetcher};
