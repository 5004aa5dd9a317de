//! Bounded-fan-out parallel executor
//!
//! Cloud batches (bulk VM boot, parallel network creation, parallel
//! deletion) run on blocking OS worker threads: every control-plane call
//! and poll wait occupies its thread. The executor is the only fan-out
//! primitive in the system and is never nested for the same resource set,
//! which bounds the total thread count.
//!
//! A failing task never cancels its siblings. Half-provisioned cloud
//! resources need cleanup, not abandonment, so every task runs to
//! completion and the failures are reported together afterwards.

use crate::error::{CloudError, ParallelFailures, Result, TaskFailure};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Default cap on worker threads for one batch.
pub const DEFAULT_MAX_WORKERS: usize = 200;

/// Options for one parallel batch.
#[derive(Debug, Clone)]
pub struct ParallelOptions {
    /// Upper bound on worker threads; the effective fan-out is the batch
    /// size when smaller.
    pub max_workers: usize,

    /// Fixed delay inserted between successive task starts, throttling
    /// control-plane request bursts.
    pub post_task_delay: Option<Duration>,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            post_task_delay: None,
        }
    }
}

impl ParallelOptions {
    pub fn with_post_task_delay(mut self, delay: Option<Duration>) -> Self {
        self.post_task_delay = delay;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
}

/// Runs `task` over every item with bounded worker fan-out.
///
/// All items are processed regardless of individual failures; if any task
/// failed, the batch raises one [`CloudError::Parallel`] naming each
/// failure with the label `describe` produced for its item.
pub fn run_parallel<T, L, F>(
    items: &mut [T],
    options: &ParallelOptions,
    describe: L,
    task: F,
) -> Result<()>
where
    T: Send,
    L: Fn(&T) -> String + Sync,
    F: Fn(&mut T) -> Result<()> + Sync,
{
    if items.is_empty() {
        return Ok(());
    }

    let workers = options.max_workers.max(1).min(items.len());
    let queue = Mutex::new(items.iter_mut());
    let failures: Mutex<Vec<TaskFailure>> = Mutex::new(Vec::new());
    // Guards the inter-task start delay; holds whether any task started.
    let throttle = Mutex::new(false);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let item = queue.lock().unwrap_or_else(|p| p.into_inner()).next();
                    let Some(item) = item else { break };

                    if let Some(delay) = options.post_task_delay {
                        let mut started =
                            throttle.lock().unwrap_or_else(|p| p.into_inner());
                        if *started {
                            thread::sleep(delay);
                        } else {
                            *started = true;
                        }
                    }

                    let label = describe(item);
                    if let Err(error) = task(item) {
                        tracing::error!("parallel task {} failed: {}", label, error);
                        failures
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .push(TaskFailure { label, error });
                    }
                }
            });
        }
    });

    let failures = failures.into_inner().unwrap_or_else(|p| p.into_inner());
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CloudError::Parallel(ParallelFailures(failures)))
    }
}
