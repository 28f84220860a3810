//! End-to-end scenarios exercising the full `Scheduler`/`graph`/
//! `objects` stack together, the way the teacher's top-level `tests/`
//! directory holds cross-cutting integration tests rather than
//! per-module unit tests.
//!
//! Each test below corresponds to one of the scheduling semantics
//! documented in DESIGN.md: read-after-write on a plain value variable,
//! writer-after-readers serialization on a shared mutable, ownership
//! merge via `attach`, an LLM tool call with a mutable side effect, a
//! nested scope temporarily taking over a parent's mutable, and
//! `read_variable`'s blocking-with-work-stealing contract.

use std::collections::HashMap;
use std::sync::Arc;

use agentflow::error::SchedulerError;
use agentflow::graph::{self, ReadItem, SyncAgentFn};
use agentflow::model::{LlmClient, ModelResponse};
use agentflow::msgseq::{ChatMessage, Literal};
use agentflow::objects::Counter;
use agentflow::tools::{Tool, ToolList};
use agentflow::{Config, Scheduler, Value, Var};

fn int_body(value: i64) -> SyncAgentFn {
    Arc::new(move |_inputs, _scheduler| Ok(vec![Value::Int(value)]))
}

#[test]
fn raw_on_value_var_fans_out_after_the_producer_completes() {
    let scheduler = Scheduler::new(Config::default());
    let a = Var::new();
    let b = Var::new();
    let c = Var::new();

    scheduler.add_task(graph::python_agent(int_body(7), vec![], vec![a]), HashMap::new()).unwrap();

    let double_a: SyncAgentFn = Arc::new(move |inputs, _scheduler| {
        let Some(Value::Int(x)) = inputs.get(&a) else { panic!("a not bound to an int") };
        Ok(vec![Value::Int(x + 1)])
    });
    scheduler
        .add_task(graph::python_agent(double_a, vec![ReadItem::Var { var: a, readonly: true }], vec![b]), HashMap::new())
        .unwrap();

    let times_two_a: SyncAgentFn = Arc::new(move |inputs, _scheduler| {
        let Some(Value::Int(x)) = inputs.get(&a) else { panic!("a not bound to an int") };
        Ok(vec![Value::Int(x * 2)])
    });
    scheduler
        .add_task(graph::python_agent(times_two_a, vec![ReadItem::Var { var: a, readonly: true }], vec![c]), HashMap::new())
        .unwrap();

    assert!(matches!(scheduler.read_variable(b), Value::Int(8)));
    assert!(matches!(scheduler.read_variable(c), Value::Int(14)));
    scheduler.shutdown().unwrap();
}

#[test]
fn writer_is_serialized_after_a_coalesced_reader_group() {
    let scheduler = Scheduler::new(Config::default());
    let counter = Arc::new(Counter::new(0));

    let read_of = |counter: Arc<Counter>| -> SyncAgentFn { Arc::new(move |_inputs, _scheduler| Ok(vec![Value::Int(counter.get())])) };

    let r1_out = Var::new();
    scheduler
        .add_task(
            graph::python_agent(
                read_of(counter.clone()),
                vec![ReadItem::Mutable { handle: counter.handle.clone(), readonly: true }],
                vec![r1_out],
            ),
            HashMap::new(),
        )
        .unwrap();

    let r2_out = Var::new();
    scheduler
        .add_task(
            graph::python_agent(
                read_of(counter.clone()),
                vec![ReadItem::Mutable { handle: counter.handle.clone(), readonly: true }],
                vec![r2_out],
            ),
            HashMap::new(),
        )
        .unwrap();

    let w_out = Var::new();
    let w_counter = counter.clone();
    let write_body: SyncAgentFn = Arc::new(move |_inputs, _scheduler| {
        w_counter.add(1);
        Ok(vec![Value::Unit])
    });
    scheduler
        .add_task(
            graph::python_agent(write_body, vec![ReadItem::Mutable { handle: counter.handle.clone(), readonly: false }], vec![w_out]),
            HashMap::new(),
        )
        .unwrap();

    let r3_out = Var::new();
    scheduler
        .add_task(
            graph::python_agent(
                read_of(counter.clone()),
                vec![ReadItem::Mutable { handle: counter.handle.clone(), readonly: true }],
                vec![r3_out],
            ),
            HashMap::new(),
        )
        .unwrap();

    assert!(matches!(scheduler.read_variable(r1_out), Value::Int(0)));
    assert!(matches!(scheduler.read_variable(r2_out), Value::Int(0)));
    assert!(matches!(scheduler.read_variable(r3_out), Value::Int(1)));
    scheduler.shutdown().unwrap();
}

#[test]
fn attach_sequences_a_later_reader_after_both_prior_owners() {
    let scheduler = Scheduler::new(Config::default());
    let x = Arc::new(Counter::new(1));
    let y = Arc::new(Counter::new(2));

    let a_out = Var::new();
    let x_for_a = x.clone();
    let body_a: SyncAgentFn = Arc::new(move |_inputs, _scheduler| {
        x_for_a.add(10);
        Ok(vec![Value::Unit])
    });
    scheduler
        .add_task(
            graph::python_agent(body_a, vec![ReadItem::Mutable { handle: x.handle.clone(), readonly: false }], vec![a_out]),
            HashMap::new(),
        )
        .unwrap();

    let b_out = Var::new();
    let y_for_b = y.clone();
    let body_b: SyncAgentFn = Arc::new(move |_inputs, _scheduler| {
        y_for_b.add(20);
        Ok(vec![Value::Unit])
    });
    scheduler
        .add_task(
            graph::python_agent(body_b, vec![ReadItem::Mutable { handle: y.handle.clone(), readonly: false }], vec![b_out]),
            HashMap::new(),
        )
        .unwrap();

    scheduler.attach(&x.handle, &y.handle);

    let c_out = Var::new();
    let y_for_c = y.clone();
    let body_c: SyncAgentFn = Arc::new(move |_inputs, _scheduler| Ok(vec![Value::Int(y_for_c.get())]));
    scheduler
        .add_task(
            graph::python_agent(body_c, vec![ReadItem::Mutable { handle: y.handle.clone(), readonly: true }], vec![c_out]),
            HashMap::new(),
        )
        .unwrap();

    assert!(matches!(scheduler.read_variable(c_out), Value::Int(22)));
    scheduler.shutdown().unwrap();
}

struct ToolCallingClient;

#[async_trait::async_trait]
impl LlmClient for ToolCallingClient {
    async fn send_data(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&ToolList>,
    ) -> Result<ModelResponse, SchedulerError> {
        Ok(ModelResponse {
            content: "done".to_string(),
            tool_calls: vec![("set_value".to_string(), serde_json::json!({"value": 99}))],
        })
    }
}

#[test]
fn llm_tool_call_mutates_a_register_visible_to_a_later_task() {
    let reg = Arc::new(Counter::new(0));
    let reg_for_tool = reg.clone();
    let tools = Arc::new(ToolList::new().with(Tool::new(
        "set_value",
        "sets the register to a given value",
        serde_json::json!({"type": "object", "properties": {"value": {"type": "integer"}}}),
        move |args| {
            reg_for_tool.add(args["value"].as_i64().unwrap_or(0));
            Ok(serde_json::Value::Null)
        },
    )));

    let scheduler = Scheduler::with_model_client(Config::default(), Arc::new(ToolCallingClient));
    let messages = Arc::new(Literal(vec![ChatMessage::new("user", "set it to 99")]));
    let llm_reads = vec![ReadItem::Mutable { handle: reg.handle.clone(), readonly: false }];
    let reply = scheduler.run_llm_agent(None, Some(tools), messages, llm_reads).unwrap();
    assert!(matches!(reply, Value::Str(_)));

    let check_out = Var::new();
    let reg_for_check = reg.clone();
    let check_body: SyncAgentFn = Arc::new(move |_inputs, _scheduler| Ok(vec![Value::Int(reg_for_check.get())]));
    scheduler
        .add_task(
            graph::python_agent(check_body, vec![ReadItem::Mutable { handle: reg.handle.clone(), readonly: true }], vec![check_out]),
            HashMap::new(),
        )
        .unwrap();

    assert!(matches!(scheduler.read_variable(check_out), Value::Int(99)));
    scheduler.shutdown().unwrap();
}

#[test]
fn nested_scope_task_sequences_before_a_later_parent_write() {
    let scheduler = Scheduler::new(Config::default());
    let fs = Arc::new(Counter::new(0));
    let fs_var = Var::new();
    let done = Var::new();

    let fs_for_inner = fs.clone();
    let inner_body: SyncAgentFn = Arc::new(move |_inputs, _scheduler| {
        fs_for_inner.add(1);
        Ok(vec![Value::Unit])
    });
    let inner_pair = graph::python_agent(inner_body, vec![ReadItem::Var { var: fs_var, readonly: false }], vec![done]);
    let nested_pair = graph::nested(inner_pair, vec![ReadItem::Var { var: fs_var, readonly: false }], vec![done]);

    let mut bindings = HashMap::new();
    bindings.insert(fs_var, Value::Mutable(fs.handle.clone()));
    scheduler.add_task(nested_pair, bindings).unwrap();

    let after_out = Var::new();
    let fs_for_after = fs.clone();
    let after_body: SyncAgentFn = Arc::new(move |_inputs, _scheduler| Ok(vec![Value::Int(fs_for_after.get())]));
    let after_pair = graph::python_agent(after_body, vec![ReadItem::Var { var: fs_var, readonly: false }], vec![after_out]);
    let mut after_bindings = HashMap::new();
    after_bindings.insert(fs_var, Value::Mutable(fs.handle.clone()));
    scheduler.add_task(after_pair, after_bindings).unwrap();

    assert!(matches!(scheduler.read_variable(after_out), Value::Int(1)));
    scheduler.shutdown().unwrap();
}

#[test]
fn read_variable_steals_queued_work_when_the_pool_is_saturated() {
    let mut config = Config::default();
    config.thread_pool_size = 0;
    let scheduler = Scheduler::new(config);

    let a = Var::new();
    let b = Var::new();
    let c = Var::new();
    scheduler.add_task(graph::python_agent(int_body(1), vec![], vec![a]), HashMap::new()).unwrap();
    scheduler.add_task(graph::python_agent(int_body(2), vec![], vec![b]), HashMap::new()).unwrap();
    scheduler.add_task(graph::python_agent(int_body(3), vec![], vec![c]), HashMap::new()).unwrap();

    assert!(matches!(scheduler.read_variable(c), Value::Int(3)));
    scheduler.shutdown().unwrap();
}
