use super::error::EngineError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use tracing::{debug, error};

/// A bounded fan-out stage.
///
/// Every unit of work runs on its own pool thread, reports back over a one-shot channel and is
/// read back in dispatch order, so callers see results in the order they submitted items no
/// matter which worker finished first. A panicking unit is reported as
/// [`EngineError::ChildWorker`] instead of tearing down the orchestrator.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    width: usize,
}

impl WorkerPool {
    pub fn new(width: usize) -> Result<Self, EngineError> {
        let width = width.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("pacs-worker-{}", i))
            .build()
            .map_err(|e| EngineError::ChildWorker {
                unit: "worker pool".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { pool, width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Runs `job` for all `items` concurrently and joins every unit before returning.
    pub fn fan_out<T, R, F, L>(&self, items: &[T], label: L, job: F) -> Vec<Result<R, EngineError>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R, EngineError> + Sync,
        L: Fn(&T) -> String,
    {
        let mut receivers = Vec::with_capacity(items.len());
        self.pool.scope(|scope| {
            for item in items {
                let (tx, rx) = mpsc::sync_channel(1);
                receivers.push(rx);
                let job = &job;
                scope.spawn(move |_| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(item)));
                    // The receiver outlives the scope, so a send can only fail if the caller
                    // stopped caring about the result.
                    let _ = tx.send(outcome);
                });
            }
        });

        items
            .iter()
            .zip(receivers)
            .map(|(item, rx)| match rx.recv() {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => {
                    let reason = panic_message(payload.as_ref());
                    error!(unit = %label(item), %reason, "worker panicked");
                    Err(EngineError::ChildWorker {
                        unit: label(item),
                        reason,
                    })
                }
                Err(_) => Err(EngineError::ChildWorker {
                    unit: label(item),
                    reason: "worker exited without reporting a result".to_string(),
                }),
            })
            .collect()
    }

    /// Splits `items` into batches of at most `width` units and runs them one batch at a time.
    ///
    /// Each batch is joined as a whole; the first failure (in dispatch order) aborts the run
    /// before `on_batch` is called for that batch, so `on_batch` only ever sees fully
    /// successful batches.
    pub fn run_batches<T, R, F, L, B>(
        &self,
        items: &[T],
        label: L,
        job: F,
        mut on_batch: B,
    ) -> Result<Vec<R>, EngineError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R, EngineError> + Sync,
        L: Fn(&T) -> String,
        B: FnMut(&[T]) -> Result<(), EngineError>,
    {
        let mut results = Vec::with_capacity(items.len());
        for (index, batch) in items.chunks(self.width).enumerate() {
            debug!(batch = index + 1, size = batch.len(), "dispatching batch");
            let outcomes = self.fan_out(batch, &label, &job);
            for outcome in outcomes {
                results.push(outcome?);
            }
            on_batch(batch)?;
        }
        Ok(results)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
