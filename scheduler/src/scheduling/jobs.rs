//! Bridges between a fired [`crate::graph::Kind::Sync`] /
//! [`crate::graph::Kind::Llm`] node and the executor contract: each job
//! owns exactly what its task body needs, runs it outside any
//! scheduler lock, and reports the outcome back through
//! [`Scheduler::node_completed`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::executor::{AsyncRunnable, SyncRunnable};
use crate::graph::{LlmSpec, ResolvedInputs, SyncAgentFn};
use crate::model::LlmClient;
use crate::mutable;
use crate::var::{Value, Var};

use super::{ScheduleNodeId, Scheduler};

/// What a fired schedule node ultimately produced, in a form
/// [`Scheduler::complete_locked`](super::Scheduler) can turn into an
/// `out_map` regardless of which kind of node produced it.
pub(super) enum TaskOutcome {
    /// Ordinary completion: one value per entry of the node's
    /// `write_set`, in order.
    Values(Vec<Value>),
    /// The task body returned an error; every declared output is bound
    /// to the error sentinel instead (section 4.6).
    Failed(String),
    /// A nested scope finished; outputs are already keyed by the
    /// specific `Var`s its `write_set` named.
    NestedOutputs(HashMap<Var, Value>),
}

pub(super) struct SyncJob {
    pub(super) body: SyncAgentFn,
    pub(super) inputs: ResolvedInputs,
}

impl SyncRunnable for SyncJob {
    fn run(self: Box<Self>, node: ScheduleNodeId, scheduler: Arc<Scheduler>) {
        let outcome = match mutable::with_current_task(node, || (self.body)(&self.inputs, &scheduler)) {
            Ok(values) => TaskOutcome::Values(values),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        };
        scheduler.node_completed(node, outcome);
    }
}

pub(super) struct LlmJob {
    pub(super) spec: LlmSpec,
    pub(super) inputs: ResolvedInputs,
    pub(super) write_set: Vec<Var>,
    pub(super) model_client: Option<Arc<dyn LlmClient>>,
}

impl LlmJob {
    async fn execute(&self, node: ScheduleNodeId) -> TaskOutcome {
        let Some(client) = &self.model_client else {
            return TaskOutcome::Failed("llm_agent fired with no LlmClient configured".to_string());
        };
        let messages = match self.spec.messages.build(&self.inputs) {
            Ok(m) => m,
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        };
        let response = match client.send_data(&messages, self.spec.tools.as_deref()).await {
            Ok(r) => r,
            Err(e) => return TaskOutcome::Failed(e.to_string()),
        };

        if let Some(tools) = &self.spec.tools {
            let invoke_result: Result<(), SchedulerError> = mutable::with_current_task(node, || {
                for (name, args) in &response.tool_calls {
                    tools.invoke(name, args.clone())?;
                }
                Ok(())
            });
            if let Err(e) = invoke_result {
                return TaskOutcome::Failed(e.to_string());
            }
        }

        let value = Value::Str(response.content);
        TaskOutcome::Values(self.write_set.iter().map(|_| value.clone()).collect())
    }
}

#[async_trait::async_trait]
impl AsyncRunnable for LlmJob {
    async fn run(self: Box<Self>, node: ScheduleNodeId, scheduler: Arc<Scheduler>) {
        let outcome = self.execute(node).await;
        scheduler.node_completed(node, outcome);
    }
}
