//! The executor contract: the thin surface the scheduler drives to
//! actually run task bodies.
//!
//! Declared an external collaborator in section 1 ("the thread pool /
//! event loop that actually runs task bodies") but, unlike the model
//! client or content store, its *contract* is specified precisely
//! (section 6) and the scheduler cannot be exercised at all without a
//! concrete implementation behind it, so [`ThreadPoolExecutor`] is
//! carried as the crate's reference implementation: a `tokio`
//! multi-thread runtime hosting the async event loop side, paired with
//! a `crossbeam-channel`-backed worker pool for opaque synchronous
//! tasks, mirroring the source `Engine`'s asyncio-loop-plus-
//! `ThreadPoolExecutor` split (section 5, `original_source`'s
//! `exec/engine.py`).
//!
//! Two task flavors, two traits: LLM agents suspend at `.await` points
//! and run on the event loop as [`AsyncRunnable`]s, while python agents
//! occupy a whole OS thread for their lifetime and run as plain
//! [`SyncRunnable`]s, matching the split in section 5.

mod pool;

pub use pool::ThreadPoolExecutor;

use std::sync::Arc;

use crate::scheduling::{ScheduleNodeId, Scheduler};

/// An async task body, dispatched onto the event loop.
#[async_trait::async_trait]
pub trait AsyncRunnable: Send {
    /// Executes the task body and reports the outcome via
    /// `scheduler.completed`.
    async fn run(self: Box<Self>, node: ScheduleNodeId, scheduler: Arc<Scheduler>);
}

/// A synchronous task body, dispatched onto the thread pool.
pub trait SyncRunnable: Send {
    /// Executes the task body and reports the outcome via
    /// `scheduler.completed`.
    fn run(self: Box<Self>, node: ScheduleNodeId, scheduler: Arc<Scheduler>);
}

/// A stolen, not-yet-started submission: the same `(item, node,
/// scheduler)` triple that was handed to `thread_queue_item`.
pub type StolenJob = (Box<dyn SyncRunnable>, ScheduleNodeId, Arc<Scheduler>);

/// The executor contract a scheduler drives.
///
/// Mirrors `original_source`'s `Engine.queueItem` /
/// `Engine.threadQueueItem` / `Engine.pendingPythonTaskCount` /
/// `Engine.shutdown`.
pub trait Executor: Send + Sync {
    /// Enqueues an async (LLM) task onto the event loop.
    fn queue_item(&self, item: Box<dyn AsyncRunnable>, node: ScheduleNodeId, scheduler: Arc<Scheduler>);

    /// Enqueues a synchronous task onto the thread pool.
    fn thread_queue_item(&self, item: Box<dyn SyncRunnable>, node: ScheduleNodeId, scheduler: Arc<Scheduler>);

    /// Attempts to pull one not-yet-started synchronous submission off
    /// the pool's queue for the calling thread to run inline, the
    /// work-stealing path a blocked caller uses to avoid deadlock
    /// when the pool is saturated. Because this draws from the same
    /// queue worker threads consume from, a stolen job is guaranteed
    /// never to also be picked up by a worker.
    fn try_steal(&self) -> Option<StolenJob>;

    /// Number of synchronous tasks queued but not yet started -
    /// consulted by the work-stealing path to decide whether stealing
    /// is worthwhile.
    fn pending_python_task_count(&self) -> usize;

    /// Drains all queues, waits for in-flight work, and stops the
    /// event loop.
    fn shutdown(&self);
}
