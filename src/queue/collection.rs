use crate::model::FetchResult;
use bitcoin::OutPoint;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Append-only, mutex-guarded log shared between workers and the coordinator.
pub struct SharedLog<T> {
    entries: Mutex<Vec<T>>,
}

impl<T> Default for SharedLog<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> SharedLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: T) {
        lock(&self.entries).push(entry);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *lock(&self.entries))
    }
}

impl<T: Clone> SharedLog<T> {
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.entries).clone()
    }
}

#[derive(Default)]
struct ResultState {
    results: Vec<FetchResult>,
    seen: HashSet<OutPoint>,
    duplicates: usize,
}

/// Result store keyed by outpoint; the first result for an identifier wins.
#[derive(Default)]
pub struct ResultCollection {
    state: Mutex<ResultState>,
}

impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result` unless one already exists for its identifier. Returns whether it was kept.
    pub fn insert(&self, result: FetchResult) -> bool {
        let mut state = lock(&self.state);
        if !state.seen.insert(result.item.id()) {
            state.duplicates += 1;
            return false;
        }
        state.results.push(result);
        true
    }

    pub fn contains(&self, id: &OutPoint) -> bool {
        lock(&self.state).seen.contains(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duplicates(&self) -> usize {
        lock(&self.state).duplicates
    }

    pub fn take(&self) -> Vec<FetchResult> {
        let mut state = lock(&self.state);
        state.seen.clear();
        std::mem::take(&mut state.results)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
