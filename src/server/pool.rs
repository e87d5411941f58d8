//! Bounded executor for connection jobs.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Type alias for the boxed future a job runs as.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A unit of work the pool can run.
pub trait Job: Send + 'static {
    /// Consume the job and produce the future that performs it.
    fn run(self) -> JobFuture;
}

/// Runs at most `max_workers` jobs at a time; the rest wait in FIFO order.
///
/// Every submitted job gets a runner task that first waits for a permit and
/// then takes the oldest queued job. Jobs that have not started yet can be
/// taken back with [`WorkerPool::cancel_queued`].
pub struct WorkerPool<J: Job> {
    max_workers: usize,
    permits: Arc<Semaphore>,
    queue: Arc<Mutex<VecDeque<J>>>,
    runners: Mutex<JoinSet<()>>,
}

impl<J: Job> WorkerPool<J> {
    /// Create a pool. Must be used from within a Tokio runtime.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            permits: Arc::new(Semaphore::new(max_workers)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            runners: Mutex::new(JoinSet::new()),
        }
    }

    /// Queue a job; it starts as soon as a worker slot is free.
    pub fn submit(&self, job: J) {
        lock(&self.queue).push_back(job);

        let permits = self.permits.clone();
        let queue = self.queue.clone();
        let mut runners = lock(&self.runners);

        // Forget runners that already finished so the set does not grow
        while let Some(result) = runners.try_join_next() {
            if let Err(e) = result {
                error!("Worker task failed: {e}");
            }
        }

        runners.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let job = lock(&queue).pop_front();
            if let Some(job) = job {
                job.run().await;
            }
        });
    }

    /// Take back every job that has not started yet.
    pub fn cancel_queued(&self) -> Vec<J> {
        let cancelled: Vec<J> = lock(&self.queue).drain(..).collect();
        if !cancelled.is_empty() {
            debug!("Cancelled {count} queued jobs", count = cancelled.len());
        }
        cancelled
    }

    /// Wait for queued and running jobs to finish.
    ///
    /// Returns `false` if they did not finish within `timeout`; whatever is
    /// still running at that point is aborted.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let mut runners = std::mem::take(&mut *lock(&self.runners));

        let finished = tokio::time::timeout(timeout, async {
            while let Some(result) = runners.join_next().await {
                if let Err(e) = result {
                    error!("Worker task failed during drain: {e}");
                }
            }
        })
        .await
        .is_ok();

        if !finished {
            warn!("Aborting {len} jobs still running after {timeout:?}", len = runners.len());
            runners.abort_all();
        }
        finished
    }

    /// Number of jobs waiting for a worker slot.
    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Number of worker slots in use.
    pub fn active(&self) -> usize {
        self.max_workers - self.permits.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
