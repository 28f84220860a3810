//! `agentflow` schedules agent programs expressed as a static dataflow
//! graph: logical variables wire task outputs to downstream reads, and
//! a per-scope scheduler fires each task the moment its dependences
//! clear.
//!
//! Two execution lanes share one dependence engine: LLM agent calls run
//! as asynchronous tasks on a `tokio` event loop, and opaque
//! synchronous ("python agent") tasks run on a dedicated OS thread
//! pool, matching the split in [`executor`]. A heap [`scoreboard`]
//! serializes concurrent access to shared mutable objects ([`mutable`],
//! [`objects`]) the same way the dependence graph serializes access to
//! logical variables.
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentflow::{graph, Config, Scheduler, Value, Var};
//!
//! let scheduler = Scheduler::new(Config::default());
//! let out = Var::new();
//! let body: agentflow::graph::SyncAgentFn = Arc::new(|_inputs, _scheduler| Ok(vec![Value::Int(42)]));
//! let pair = graph::python_agent(body, Vec::new(), vec![out]);
//! scheduler.add_task(pair, Default::default()).unwrap();
//! assert!(matches!(scheduler.read_variable(out), Value::Int(42)));
//! scheduler.shutdown().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod msgseq;
pub mod mutable;
pub mod objects;
pub mod scheduling;
pub mod scoreboard;
pub mod tools;
pub mod var;

pub use config::Config;
pub use error::SchedulerError;
pub use graph::{do_while, if_else, llm_agent, nested, python_agent, runnable, sequence, GraphPair};
pub use scheduling::Scheduler;
pub use var::{ReadOnly, ReadOnlyProxy, Value, Var};
