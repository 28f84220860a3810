//! Error taxonomy for the scheduler.
//!
//! Mirrors the split the specification draws in its error-handling
//! section: programmer errors abort (they indicate a bug in the graph
//! or in the scheduler itself, and the source's informal exceptions
//! become `panic!`/`assert!` here since there is no sensible recovery),
//! while everything a caller can reasonably inspect and react to -
//! malformed configuration, a task body's own failure, an unresolved
//! variable reaching the public API - is a [`SchedulerError`] returned
//! through `Result`.

use std::fmt;

use crate::var::Var;

/// Errors returned by the public scheduler API.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SchedulerError {
    /// A task body raised an error; propagated to every waiter of the
    /// variables that task was meant to produce.
    #[error("task body failed: {0}")]
    TaskFailed(String),

    /// A graph referenced a variable with no producer and no bound
    /// value reachable from the current scope at scan time.
    #[error("variable {0:?} used before it was defined")]
    UseBeforeDefine(Var),

    /// A single task's read_set named the same mutable both as a bare
    /// mutable reference and wrapped in `ReadOnly` in a way that leaves
    /// its effective access mode ambiguous.
    #[error("mixed read-only and mutable access to the same mutable within one task")]
    ConflictingAccessMode,

    /// `shutdown` was invoked on a scheduler that is not the root of
    /// its scope tree.
    #[error("shutdown() may only be called on a root scheduler")]
    NotRootScheduler,

    /// Configuration supplied via `getopts`-style arguments was invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The remote model client failed after exhausting its retry
    /// budget.
    #[error("model client error: {0}")]
    ModelClient(String),

    /// An I/O failure from a reference `Mutable` collaborator (the
    /// content store, the process wrapper, the model cache).
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Io(err.to_string())
    }
}

/// The error sentinel forwarded along a variable when its producing
/// task failed, in place of the value it would otherwise have bound.
///
/// Corresponds to the "distinguished sentinel" of section 4.6: rather
/// than re-raising at every downstream site, the failure is carried as
/// ordinary data so normal dataflow propagation takes care of fan-out.
#[derive(Debug, Clone)]
pub struct ErrorSentinel(pub String);

impl fmt::Display for ErrorSentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<error: {}>", self.0)
    }
}
