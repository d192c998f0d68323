//! Spawning and reaping of detail workers.

use super::worker::{ItemWorker, WorkerShared};
use crate::http::DetailSource;
use crate::runtime::fatal::FatalErrorHandler;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks; worker `i` talks to `sources[i % sources.len()]`.
    pub(crate) fn launch(
        workers: usize,
        sources: &[Arc<dyn DetailSource>],
        shared: Arc<WorkerShared>,
        run_token: CancellationToken,
        fatal_handler: Arc<FatalErrorHandler>,
    ) -> Self {
        let mut handles = Vec::with_capacity(workers);
        if sources.is_empty() {
            return Self { handles };
        }

        for worker_id in 0..workers {
            let source = Arc::clone(&sources[worker_id % sources.len()]);
            let worker = ItemWorker::new(worker_id, source, Arc::clone(&shared), run_token.clone());
            let fatal_handler = Arc::clone(&fatal_handler);

            let handle = tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        let context = format!("worker {worker_id} exited with error");
                        let err = err.context(context.clone());
                        fatal_handler.trigger(context.as_str(), err);
                    }
                    Err(panic_payload) => {
                        let panic_msg = panic_message(panic_payload.as_ref());
                        tracing::error!(
                            worker = worker_id,
                            panic = %panic_msg,
                            "detail worker panicked"
                        );
                        let context = format!("worker {worker_id} panicked");
                        fatal_handler.trigger(
                            context.as_str(),
                            anyhow::anyhow!("worker {worker_id} panicked: {panic_msg}"),
                        );
                    }
                }
            });

            handles.push(handle);
        }

        Self { handles }
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker task to return.
    pub(crate) async fn join(self) {
        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            if let Err(err) = handle.await {
                tracing::warn!(worker = worker_id, error = %err, "detail worker task failed to join");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
