//! Fixed-size worker pool driving fetch tasks to completion.
//!
//! Each worker loops: take a lease from the [`TaskQueue`], run the task up
//! to the retry budget, then either hand its children back to the queue or
//! abandon it. Workers stop when the queue is drained (nothing pending,
//! nothing in flight) or when the pool's cancellation token fires; a
//! cancelled worker drops its in-flight attempt at the next await point.
//!
//! # Example
//!
//! ```no_run
//! use crawler_core::pool::{RetryPolicy, WorkerPool};
//! use crawler_core::task::{FetchTask, TaskContext};
//!
//! # async fn example(ctx: TaskContext) -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(8, RetryPolicy::default())?;
//! let stats = pool.run(ctx, vec![FetchTask::ListingPage(2)]).await?;
//! println!("{} completed, {} abandoned", stats.completed(), stats.abandoned());
//! # Ok(())
//! # }
//! ```

mod retry;

pub use retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, FailureType, RetryDecision, RetryPolicy};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::queue::TaskQueue;
use crate::task::{FetchTask, TaskContext};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 50;

/// Errors from running the pool itself (task failures are not pool errors).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Worker count must be at least 1.
    #[error("invalid worker count {0}: must be at least 1")]
    InvalidWorkerCount(usize),

    /// A worker panicked; remaining workers were cancelled.
    #[error("worker failed: {0}")]
    WorkerFailed(#[from] tokio::task::JoinError),
}

/// Counters for one pool run.
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicUsize,
    abandoned: AtomicUsize,
    attempts: AtomicUsize,
    retried: AtomicUsize,
    cancelled: AtomicBool,
}

impl PoolStats {
    /// Tasks that succeeded.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks given up on after a permanent failure or exhausting the budget.
    #[must_use]
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Attempts made across all tasks.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Attempts that were followed by another attempt of the same task.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns `true` if a worker stopped on cancellation with work outstanding.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            abandoned: AtomicUsize::new(self.abandoned()),
            attempts: AtomicUsize::new(self.attempts()),
            retried: AtomicUsize::new(self.retried()),
            cancelled: AtomicBool::new(self.was_cancelled()),
        }
    }
}

/// Runs fetch tasks on a fixed number of concurrent workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool of `workers` workers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidWorkerCount`] if `workers` is 0.
    pub fn new(workers: usize, retry: RetryPolicy) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::InvalidWorkerCount(workers));
        }
        Ok(Self {
            workers,
            retry,
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `token` to stop the pool from outside.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token that cancels this pool.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Attempt budget and backoff applied to each task.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs `seeds` and every task they produce until the queue drains or the
    /// pool is cancelled, then waits for every worker to stop.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::WorkerFailed`] if a worker panicked.
    #[instrument(skip_all, fields(workers = self.workers, seeds = seeds.len()))]
    pub async fn run(
        &self,
        ctx: TaskContext,
        seeds: Vec<FetchTask>,
    ) -> Result<PoolStats, PoolError> {
        let queue = Arc::new(TaskQueue::with_tasks(seeds));
        let stats = Arc::new(PoolStats::default());
        let ctx = Arc::new(ctx);
        let cancel = self.cancel.child_token();

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(worker_loop(
                worker,
                Arc::clone(&queue),
                Arc::clone(&ctx),
                self.retry.clone(),
                cancel.clone(),
                Arc::clone(&stats),
            ));
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker failed, stopping pool");
                cancel.cancel();
                queue.close();
                failure.get_or_insert(e);
            }
        }

        if let Some(e) = failure {
            return Err(PoolError::WorkerFailed(e));
        }

        if stats.was_cancelled() {
            warn!(pending = queue.len(), "pool cancelled");
        }

        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot());
        info!(
            completed = stats.completed(),
            abandoned = stats.abandoned(),
            attempts = stats.attempts(),
            "pool finished"
        );
        Ok(stats)
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<TaskQueue>,
    ctx: Arc<TaskContext>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
) {
    loop {
        // A drained queue wins over a late cancel, so a finished run is not
        // reported as interrupted.
        let lease = tokio::select! {
            biased;
            lease = queue.get() => match lease {
                Some(lease) => lease,
                None => break,
            },
            () = cancel.cancelled() => {
                stats.cancelled.store(true, Ordering::SeqCst);
                break;
            }
        };

        let children = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stats.cancelled.store(true, Ordering::SeqCst);
                break;
            }
            children = execute_with_retry(lease.task(), &ctx, &retry, &stats) => children,
        };

        match children {
            Some(children) => {
                stats.completed.fetch_add(1, Ordering::SeqCst);
                lease.complete(children);
            }
            None => {
                stats.abandoned.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
    debug!(worker, "worker stopped");
}

/// Runs `task` until it succeeds or the policy gives up; `None` means abandoned.
async fn execute_with_retry(
    task: &FetchTask,
    ctx: &TaskContext,
    retry: &RetryPolicy,
    stats: &PoolStats,
) -> Option<Vec<FetchTask>> {
    let max_attempts = retry.max_attempts();
    let mut attempt = 1;

    loop {
        stats.attempts.fetch_add(1, Ordering::SeqCst);
        let error = match task.execute(ctx).await {
            Ok(children) => {
                if attempt > 1 {
                    info!(task = %task, attempt, "succeeded after retry");
                }
                return Some(children);
            }
            Err(error) => error,
        };

        warn!(task = %task, attempt, max_attempts, error = %error, "task attempt failed");

        match retry.should_retry(FailureType::from(&error), attempt) {
            RetryDecision::Retry { delay, attempt: next } => {
                stats.retried.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt = next;
            }
            RetryDecision::DoNotRetry { reason } => {
                error!(
                    task = %task,
                    attempts = attempt,
                    reason = %reason,
                    error = %error,
                    "abandoning task"
                );
                return None;
            }
        }
    }
}
