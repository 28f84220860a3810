//! Structured event logging infrastructure shared by the scheduler.
//!
//! The scheduler crate is inherently multi-threaded (a thread pool for
//! python agents, an async event loop for LLM agents, and one scheduler
//! lock per nested scope), so this is a thread-safe rewrite of the
//! teacher crate's `Rc<RefCell<_>>`-based `Registry`/`Logger` pair: the
//! same "named, typed event streams with an installable sink" shape,
//! built on `Arc`/`Mutex` instead of `Rc`/`RefCell`, and wired to
//! [`tracing`] so events always flow somewhere observable even when no
//! sink has been installed.

#![forbid(missing_docs)]

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// A named registry of typed event sinks.
///
/// Mirrors the teacher crate's `logging_core::Registry`: callers bind a
/// name to an action that observes a stream of events of some type `T`,
/// and retrieve a cloneable [`Logger`] for that name elsewhere in the
/// program. Unlike the teacher's version this registry is `Send + Sync`
/// so it can be shared across scheduler threads.
#[derive(Clone, Default)]
pub struct Registry {
    map: Arc<Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to a logger that invokes `action` for every event.
    ///
    /// Replaces any previously installed sink for `name`; existing
    /// clones of the old [`Logger`] keep writing to the old sink.
    pub fn insert<T, F>(&self, name: impl Into<String>, action: F)
    where
        T: 'static + Send + Sync + Debug,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let logger = Logger::<T>::new(Arc::new(action));
        self.map.lock().unwrap().insert(name.into(), Box::new(logger));
    }

    /// Returns a clone of the logger bound to `name`, if any.
    pub fn get<T: 'static + Send + Sync + Debug>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .lock()
            .unwrap()
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Logger<T>>())
            .cloned()
    }

    /// Removes the sink bound to `name`, if any.
    pub fn remove(&self, name: &str) {
        self.map.lock().unwrap().remove(name);
    }
}

/// A cloneable handle to a typed event sink.
///
/// Every call to [`Logger::log`] both forwards the event to the
/// installed action (if the registry still has one set) and emits a
/// `tracing` event at `DEBUG` level carrying the event's `Debug`
/// representation, so `RUST_LOG=agentflow=debug` is always sufficient to
/// observe scheduler activity without wiring up a sink.
pub struct Logger<T> {
    action: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger { action: self.action.clone() }
    }
}

impl<T: Debug> Logger<T> {
    fn new(action: Arc<dyn Fn(&T) + Send + Sync>) -> Self {
        Logger { action }
    }

    /// Logs a single event.
    pub fn log(&self, event: T) {
        tracing::debug!(event = ?event, "scheduler event");
        (self.action)(&event);
    }
}

/// A scope's lifecycle event, analogous to the teacher's `OperatesEvent`.
#[derive(Debug, Clone)]
pub enum ScopeEvent {
    /// A new scheduler scope was created for a graph scan.
    Started {
        /// Scheduler-assigned scope identifier.
        scope_id: usize,
        /// Human-readable name of the scope (e.g. "root", "nested").
        name: String,
    },
    /// A scope's window size reached zero and it finished.
    Finished {
        /// Scheduler-assigned scope identifier.
        scope_id: usize,
    },
}

/// A schedule node's lifecycle event, analogous to the teacher's
/// `ScheduleEvent`.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A schedule node's dependences all cleared and it was submitted to
    /// an executor.
    Started {
        /// Schedule node identifier.
        id: u64,
    },
    /// A schedule node's task body returned (successfully or not).
    Completed {
        /// Schedule node identifier.
        id: u64,
        /// Whether the task body returned an error.
        failed: bool,
    },
}

/// A scoreboard transition event, useful for diagnosing unexpected
/// serialization of supposedly-concurrent readers.
#[derive(Debug, Clone)]
pub enum ScoreboardEvent {
    /// A task was registered as a reader and had to wait.
    ReaderBlocked {
        /// Schedule node identifier of the blocked reader.
        id: u64,
    },
    /// A task was registered as a writer and had to wait.
    WriterBlocked {
        /// Schedule node identifier of the blocked writer.
        id: u64,
    },
    /// Two access queues were merged as part of an ownership union.
    QueuesMerged {
        /// Number of nodes in the resulting merged queue.
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn logger_forwards_to_installed_sink() {
        let registry = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        registry.insert::<TaskEvent, _>("scheduler", move |_event| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        let logger = registry.get::<TaskEvent>("scheduler").expect("logger installed");
        logger.log(TaskEvent::Started { id: 1 });
        logger.log(TaskEvent::Completed { id: 1, failed: false });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_sink_returns_none() {
        let registry = Registry::new();
        assert!(registry.get::<TaskEvent>("nope").is_none());
    }
}
