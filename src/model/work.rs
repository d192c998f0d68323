use super::utxo::Utxo;
use crate::http::FailureClass;
use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};

/// A UTXO whose parent transaction has to be fetched.
///
/// Identity is the outpoint: two work items compare equal when they reference the same
/// output, whatever the rest of their metadata says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    utxo: Utxo,
}

impl WorkItem {
    pub fn new(utxo: Utxo) -> Self {
        Self { utxo }
    }

    pub fn id(&self) -> OutPoint {
        self.utxo.outpoint
    }

    pub fn txid(&self) -> Txid {
        self.utxo.outpoint.txid
    }
}

impl From<Utxo> for WorkItem {
    fn from(utxo: Utxo) -> Self {
        Self::new(utxo)
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for WorkItem {}

impl Hash for WorkItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// Detail record fetched for one work item.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub item: WorkItem,
    pub record: Value,
    pub worker: usize,
    pub attempt: u32,
}

/// Advisory log entry for one failed attempt.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub item: OutPoint,
    pub worker: usize,
    pub shard: String,
    pub attempt: u32,
    pub class: FailureClass,
    pub message: String,
}

/// Terminal outcome for an item that exhausted its retry budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub item: WorkItem,
    pub attempts: u32,
    pub class: FailureClass,
    pub last_error: String,
}
