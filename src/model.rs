//! Domain records flowing through both acquisition stages: normalized UTXOs,
//! work items and the result, failure and dead-letter records.

pub mod utxo;
pub mod work;

pub use utxo::{total_value, RawUnspent, Utxo};
pub use work::{DeadLetter, FetchFailure, FetchResult, WorkItem};
