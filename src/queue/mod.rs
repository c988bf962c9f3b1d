//! In-memory FIFO of pending fetch tasks with drain detection.
//!
//! A worker takes a task with [`TaskQueue::get`], which returns a
//! [`TaskLease`]. While a lease is alive the task counts as in flight. The
//! queue is *drained* when nothing is pending and nothing is in flight; from
//! then on every `get` returns `None`, which is how workers learn the crawl
//! is finished.
//!
//! Finishing a lease with [`TaskLease::complete`] enqueues the children and
//! releases the in-flight slot in one step, so a waiting worker can never
//! observe an empty queue between a parent finishing and its children
//! arriving. Dropping a lease without completing it (abandonment or
//! cancellation) only releases the slot.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

use crate::task::FetchTask;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<FetchTask>,
    in_flight: usize,
    closed: bool,
}

/// Shared queue of pending work.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue holding `tasks` in order.
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = FetchTask>) -> Self {
        let queue = Self::new();
        queue.lock().pending.extend(tasks);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a task. Ignored once the queue is closed.
    pub fn put(&self, task: FetchTask) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.pending.push_back(task);
        }
        self.changed.notify_waiters();
    }

    /// Waits for the next task.
    ///
    /// Returns `None` once the queue is drained or closed.
    pub async fn get(&self) -> Option<TaskLease<'_>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Registered before the state check; notify_waiters only wakes
            // already-enabled waiters.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if !state.closed {
                    if let Some(task) = state.pending.pop_front() {
                        state.in_flight += 1;
                        return Some(TaskLease {
                            queue: self,
                            task,
                            finished: false,
                        });
                    }
                    if state.in_flight == 0 {
                        trace!("queue drained");
                        state.closed = true;
                    }
                }
                if state.closed {
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stops handing out tasks; pending tasks are discarded and waiters wake with `None`.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.pending.clear();
        }
        self.changed.notify_waiters();
    }

    /// Number of tasks waiting to be taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns `true` if no task is waiting to be taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of leases currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Returns `true` when nothing is pending and nothing is in flight.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    fn finish(&self, children: Vec<FetchTask>) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            if !state.closed {
                state.pending.extend(children);
            }
        }
        self.changed.notify_waiters();
    }
}

/// Exclusive hold on one task taken from a [`TaskQueue`].
#[derive(Debug)]
pub struct TaskLease<'a> {
    queue: &'a TaskQueue,
    task: FetchTask,
    finished: bool,
}

impl TaskLease<'_> {
    /// The leased task.
    #[must_use]
    pub fn task(&self) -> &FetchTask {
        &self.task
    }

    /// Finishes the task, enqueueing `children`.
    pub fn complete(mut self, children: Vec<FetchTask>) {
        self.finished = true;
        self.queue.finish(children);
    }
}

impl Drop for TaskLease<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.queue.finish(Vec::new());
        }
    }
}
