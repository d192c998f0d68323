use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

struct QueueState<T> {
    items: VecDeque<T>,
    unfinished: usize,
}

/// Async FIFO with unfinished-task accounting.
///
/// Every `push` raises the unfinished count and every `task_done` lowers it; [`WorkQueue::join`]
/// resolves once the count reaches zero, which means every pushed entry has been popped and
/// acknowledged. `len` is approximate under concurrency and only suitable for progress.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Notify,
    drained: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let items: VecDeque<T> = items.into_iter().collect();
        let unfinished = items.len();
        Self {
            state: Mutex::new(QueueState { items, unfinished }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        {
            let mut state = self.lock();
            state.items.push_back(item);
            state.unfinished += 1;
        }
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Waits until an entry is available and removes it.
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.available.notified();
            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }

    /// Acknowledges one popped entry. Fails if more acknowledgements than pushes were issued.
    pub fn task_done(&self) -> Result<()> {
        let drained = {
            let mut state = self.lock();
            if state.unfinished == 0 {
                bail!("task_done called more times than entries were pushed");
            }
            state.unfinished -= 1;
            state.unfinished == 0
        };
        if drained {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Returns a guard that acknowledges one popped entry when dropped.
    pub fn task_guard(&self) -> TaskGuard<'_, T> {
        TaskGuard { queue: self }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries pushed but not yet acknowledged, queued or in flight.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    /// Resolves once every pushed entry has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    // Critical sections never leave the state half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Calls [`WorkQueue::task_done`] exactly once when dropped.
pub struct TaskGuard<'a, T> {
    queue: &'a WorkQueue<T>,
}

impl<T> Drop for TaskGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.queue.task_done() {
            tracing::error!(error = %err, "work queue accounting underflow");
        }
    }
}
