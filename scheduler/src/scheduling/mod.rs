//! The dependence scheduler: per-scope scan/fire/complete over the
//! static graph, plus the mutable-access synchronization primitives
//! (`read_variable`, `obj_access`, `attach`) built on top of it.
//!
//! Grounded on `original_source`'s `exec/scheduler.py` (`Scheduler`,
//! `ScheduleNode`, the module-level `ScoreBoard`) and `exec/engine.py`
//! (the event-loop/thread-pool split a fired node dispatches onto).
//! Where the source relies on Python's GIL to make `scan`/`completed`
//! effectively atomic, this implementation uses one `parking_lot::Mutex`
//! per scope guarding exactly the state the source's single-threaded
//! critical sections touch - the "scheduler lock" the concurrency model
//! names explicitly.

pub mod schedule_node;
pub mod task_node;
mod jobs;

pub use schedule_node::{Access, ScheduleNode, ScheduleNodeId, Waiter};
pub use task_node::TaskNode;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::Config;
use crate::error::SchedulerError;
use crate::executor::Executor;
use crate::graph::{self, GraphNode, GraphPair, Kind, ReadItem, VarWaitSlot};
use crate::model::LlmClient;
use crate::mutable::{self, MutableHandle, MutableKey};
use crate::scoreboard::{Disposition, Scoreboard};
use crate::tools::ToolList;
use crate::var::{Binding, Value, Var, VarMap};

use jobs::{LlmJob, SyncJob, TaskOutcome};

/// Registers `task`'s access to ownership root `root` on `sched`,
/// mirroring the registration onto the scoreboard. Returns whether the
/// registration left the task waiting behind a conflicting access
/// (`true`) or free to proceed immediately (`false`).
///
/// Grounded on `scheduler.py`'s `handleReference`/`addRef`: upgrade a
/// reader already registered on `root` to a writer in place, otherwise
/// register fresh. Takes `sched` by direct reference rather than a
/// `ScheduleNodeId` lookup so it works identically during scan-time
/// construction (before the node is reachable from `state.nodes`) and
/// during completion-time delivery (after it is).
fn register_access(scoreboard: &mut Scoreboard, sched: &mut ScheduleNode, root: &MutableHandle, reader: bool) -> bool {
    match sched.refs.get(root).copied() {
        Some(Access::Write) => false,
        Some(Access::Read) if reader => false,
        Some(Access::Read) => {
            sched.refs.insert(root.clone(), Access::Write);
            scoreboard.change_to_writer(root.key(), sched.id) == Disposition::Conflict
        }
        None => {
            sched.refs.insert(root.clone(), if reader { Access::Read } else { Access::Write });
            let disposition = if reader {
                scoreboard.add_reader(root.key(), sched.id)
            } else {
                scoreboard.add_writer(root.key(), sched.id)
            };
            disposition == Disposition::Conflict
        }
    }
}

fn register_access_for(state: &mut State, node_id: ScheduleNodeId, handle: &MutableHandle, reader: bool) -> bool {
    let (root, _owner) = mutable::find(handle);
    match state.nodes.get_mut(&node_id) {
        Some(node) => register_access(&mut state.scoreboard, node, &root, reader),
        None => false,
    }
}

struct State {
    var_map: VarMap,
    scoreboard: Scoreboard,
    nodes: HashMap<ScheduleNodeId, ScheduleNode>,
    fifo: VecDeque<TaskNode>,
    window_size: usize,
    window_stall: Option<GraphNode>,
    finished: bool,
}

impl State {
    fn new() -> Self {
        State {
            var_map: VarMap::new(),
            scoreboard: Scoreboard::new(),
            nodes: HashMap::new(),
            fifo: VecDeque::new(),
            window_size: 0,
            window_stall: None,
            finished: false,
        }
    }
}

struct ScopeLink {
    parent: Arc<Scheduler>,
    parent_node: ScheduleNodeId,
    write_set: Vec<Var>,
}

/// One scope's scheduler: the dependence scheduler, the heap
/// scoreboard for this scope, and the variable map, all guarded by one
/// lock. A nested scope (section 4.3) gets its own `Scheduler`, linked
/// back to the parent node whose completion it will eventually drive.
pub struct Scheduler {
    state: Mutex<State>,
    idle: Condvar,
    link: Option<ScopeLink>,
    executor: Arc<dyn Executor>,
    config: Config,
    model_client: Option<Arc<dyn LlmClient>>,
    logging: agentflow_logging::Registry,
}

impl Scheduler {
    /// Builds a root scheduler (no parent scope) over `executor`, with
    /// every event sink a no-op until the caller installs its own.
    pub fn new_root(executor: Arc<dyn Executor>, config: Config, model_client: Option<Arc<dyn LlmClient>>) -> Arc<Self> {
        let logging = agentflow_logging::Registry::new();
        logging.insert::<agentflow_logging::TaskEvent, _>("scheduler", |_| {});
        logging.insert::<agentflow_logging::ScopeEvent, _>("scheduler", |_| {});
        logging.insert::<agentflow_logging::ScoreboardEvent, _>("scheduler", |_| {});
        Self::new_root_with_logging(executor, config, model_client, logging)
    }

    /// Builds a root scheduler sharing an already-configured event
    /// registry, for callers that want their own sinks wired before any
    /// task runs.
    pub fn new_root_with_logging(
        executor: Arc<dyn Executor>,
        config: Config,
        model_client: Option<Arc<dyn LlmClient>>,
        logging: agentflow_logging::Registry,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Scheduler {
            state: Mutex::new(State::new()),
            idle: Condvar::new(),
            link: None,
            executor,
            config,
            model_client,
            logging,
        });
        scheduler.log_scope(agentflow_logging::ScopeEvent::Started { scope_id: 0, name: "root".to_string() });
        scheduler
    }

    /// Builds a root scheduler backed by the reference
    /// [`crate::executor::ThreadPoolExecutor`], for callers that don't
    /// need a custom executor.
    pub fn new(config: Config) -> Arc<Self> {
        let executor = Arc::new(crate::executor::ThreadPoolExecutor::new(config.thread_pool_size));
        Self::new_root(executor, config, None)
    }

    /// Like [`Scheduler::new`], additionally wiring an [`LlmClient`]
    /// for `llm_agent` nodes to dispatch through.
    pub fn with_model_client(config: Config, client: Arc<dyn LlmClient>) -> Arc<Self> {
        let executor = Arc::new(crate::executor::ThreadPoolExecutor::new(config.thread_pool_size));
        Self::new_root(executor, config, Some(client))
    }

    fn new_child(parent: Arc<Scheduler>, parent_node: ScheduleNodeId, write_set: Vec<Var>) -> Arc<Self> {
        let executor = parent.executor.clone();
        let config = parent.config.clone();
        let model_client = parent.model_client.clone();
        let logging = parent.logging.clone();
        let child = Arc::new(Scheduler {
            state: Mutex::new(State::new()),
            idle: Condvar::new(),
            link: Some(ScopeLink { parent, parent_node, write_set }),
            executor,
            config,
            model_client,
            logging,
        });
        child.log_scope(agentflow_logging::ScopeEvent::Started { scope_id: child.scope_id() as usize, name: "nested".to_string() });
        child
    }

    /// Builds a root scheduler whose executor panics if anything is
    /// ever actually dispatched through it - for tests that only need
    /// *a* `Arc<Scheduler>` to pass along, never one that runs real
    /// work (e.g. this crate's own `ThreadPoolExecutor` unit tests).
    #[cfg(test)]
    pub fn new_root_for_test() -> Arc<Self> {
        struct PanicExecutor;
        impl Executor for PanicExecutor {
            fn queue_item(&self, _item: Box<dyn crate::executor::AsyncRunnable>, _node: ScheduleNodeId, _scheduler: Arc<Scheduler>) {
                unreachable!("test scheduler's executor should never be asked to dispatch anything")
            }
            fn thread_queue_item(&self, _item: Box<dyn crate::executor::SyncRunnable>, _node: ScheduleNodeId, _scheduler: Arc<Scheduler>) {
                unreachable!("test scheduler's executor should never be asked to dispatch anything")
            }
            fn try_steal(&self) -> Option<crate::executor::StolenJob> {
                None
            }
            fn pending_python_task_count(&self) -> usize {
                0
            }
            fn shutdown(&self) {}
        }
        Scheduler::new_root(Arc::new(PanicExecutor), Config::default(), None)
    }

    fn log_task(&self, event: agentflow_logging::TaskEvent) {
        if let Some(logger) = self.logging.get::<agentflow_logging::TaskEvent>("scheduler") {
            logger.log(event);
        }
    }

    fn log_scope(&self, event: agentflow_logging::ScopeEvent) {
        if let Some(logger) = self.logging.get::<agentflow_logging::ScopeEvent>("scheduler") {
            logger.log(event);
        }
    }

    fn log_scoreboard(&self, event: agentflow_logging::ScoreboardEvent) {
        if let Some(logger) = self.logging.get::<agentflow_logging::ScoreboardEvent>("scheduler") {
            logger.log(event);
        }
    }

    fn scope_id(&self) -> u64 {
        match &self.link {
            Some(link) => link.parent_node.raw(),
            None => 0,
        }
    }

    // ---- public submission surface -----------------------------------

    /// Submits `pair` for scanning, seeding `bindings` into this
    /// scope's variable map first.
    ///
    /// If no scan is already in progress (the lock is always free
    /// between calls, since scanning never blocks while holding it) this
    /// drains the whole FIFO immediately, matching the source's "if this
    /// is the only queued task, run it now" shortcut generalized to: the
    /// lock being free at all means nothing is mid-scan.
    pub fn add_task(self: &Arc<Self>, pair: GraphPair, bindings: HashMap<Var, Value>) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        state.fifo.push_back(TaskNode::with_bindings(pair.start, bindings));
        self.scan_locked(&mut state, None)
    }

    /// Builds and submits an opaque synchronous task, blocking until
    /// every declared output is available.
    pub fn run_python_agent(
        self: &Arc<Self>,
        body: crate::graph::SyncAgentFn,
        reads: Vec<ReadItem>,
        outs: Vec<Var>,
    ) -> Result<Vec<Value>, SchedulerError> {
        let pair = graph::python_agent(body, reads, outs.clone());
        self.add_task(pair, HashMap::new())?;
        Ok(outs.into_iter().map(|v| self.read_variable(v)).collect())
    }

    /// Builds and submits an LLM agent call, blocking for its reply.
    pub fn run_llm_agent(
        self: &Arc<Self>,
        conversation: Option<Var>,
        tools: Option<Arc<ToolList>>,
        messages: Arc<dyn crate::msgseq::MsgSeq>,
        reads: Vec<ReadItem>,
    ) -> Result<Value, SchedulerError> {
        let out = Var::new();
        let pair = graph::llm_agent(out, conversation, tools, messages, reads);
        self.add_task(pair, HashMap::new())?;
        Ok(self.read_variable(out))
    }

    /// Blocks the calling thread until `var` resolves, returning its
    /// value. While blocked, the caller may steal and inline-run a
    /// queued synchronous task from the executor to make forward
    /// progress instead of idling (section 4.4).
    pub fn read_variable(self: &Arc<Self>, var: Var) -> Value {
        let slot = VarWaitSlot::new();
        let pair = graph::var_wait(ReadItem::Var { var, readonly: true }, slot.clone());
        self.add_task(pair, HashMap::new())
            .expect("read_variable: constructing the synthetic wait node cannot fail");
        self.block_on_slot(&slot)
    }

    fn block_on_slot(&self, slot: &VarWaitSlot) -> Value {
        let mut guard = slot.result.lock().unwrap();
        loop {
            if let Some(value) = guard.take() {
                return value;
            }
            if let Some((item, node, scheduler)) = self.executor.try_steal() {
                drop(guard);
                item.run(node, scheduler);
                guard = slot.result.lock().unwrap();
                continue;
            }
            let (g, _timeout) = slot.cond.wait_timeout(guard, Duration::from_millis(20)).unwrap();
            guard = g;
        }
    }

    /// Blocks the calling task (identified via [`mutable::current_task`])
    /// until it may access `handle` with the given access mode, stealing
    /// queued synchronous work in the meantime rather than occupying a
    /// pool thread uselessly.
    ///
    /// Grounded on `mutable.py`'s `waitForAccess`; rendered as a short
    /// poll-and-steal loop rather than a condition variable per root
    /// because the scoreboard here is plain data with no waiters list of
    /// its own (section 9's design note on avoiding a second parallel
    /// notification mechanism alongside the dependence graph).
    pub fn obj_access(self: &Arc<Self>, handle: &MutableHandle, reader: bool) {
        let task = mutable::current_task();
        loop {
            {
                let mut state = self.state.lock();
                let (root, _owner) = mutable::find(handle);
                let key = root.key();
                let already_registered = state.nodes.get(&task).map_or(false, |n| n.refs.contains_key(&root));
                if already_registered {
                    if state.scoreboard.head(key).contains(&task) {
                        return;
                    }
                } else if state.nodes.contains_key(&task) {
                    let blocked = register_access_for(&mut state, task, &root, reader);
                    if !blocked {
                        return;
                    }
                    self.log_scoreboard_block(&state, task, reader, key);
                } else if state.scoreboard.is_empty(key) {
                    return;
                }
            }
            if let Some((item, node, scheduler)) = self.executor.try_steal() {
                item.run(node, scheduler);
            } else {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    fn log_scoreboard_block(&self, state: &State, task: ScheduleNodeId, reader: bool, key: MutableKey) {
        if state.scoreboard.head(key).contains(&task) {
            return;
        }
        let event = if reader {
            agentflow_logging::ScoreboardEvent::ReaderBlocked { id: task.raw() }
        } else {
            agentflow_logging::ScoreboardEvent::WriterBlocked { id: task.raw() }
        };
        self.log_scoreboard(event);
    }

    /// Waits for access to `handle`'s ownership root and then claims it
    /// for the current task, unless the current task already owns it.
    pub fn wait_for_access(self: &Arc<Self>, handle: &MutableHandle, reader: bool) {
        let (root, owner) = mutable::find(handle);
        if owner == mutable::current_task() {
            return;
        }
        self.obj_access(&root, reader);
        mutable::set_owning_task(&root, mutable::current_task());
    }

    /// Unions `child`'s ownership tree into `parent`'s, merging their
    /// scoreboard queues (section 4.1's `set_owning_object`).
    pub fn attach(self: &Arc<Self>, child: &MutableHandle, parent: &MutableHandle) {
        self.wait_for_access(child, false);
        self.wait_for_access(parent, false);
        let mut state = self.state.lock();
        let (winner, absorbed) = mutable::union(child, parent);
        if winner != absorbed {
            state.scoreboard.merge(absorbed.key(), winner.key());
            let len = state.scoreboard.head(winner.key()).len();
            self.log_scoreboard(agentflow_logging::ScoreboardEvent::QueuesMerged { len });
        }
    }

    /// Blocks until this root scope and every descendant scope has
    /// fully drained (window size zero, FIFO empty, nothing stalled),
    /// then shuts down the executor.
    pub fn shutdown(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.link.is_some() {
            return Err(SchedulerError::NotRootScheduler);
        }
        let mut state = self.state.lock();
        while state.window_size != 0 || !state.fifo.is_empty() || state.window_stall.is_some() {
            self.idle.wait(&mut state);
        }
        drop(state);
        self.log_scope(agentflow_logging::ScopeEvent::Finished { scope_id: 0 });
        self.executor.shutdown();
        Ok(())
    }

    // ---- scan ----------------------------------------------------------

    fn scan_locked(self: &Arc<Self>, state: &mut State, start: Option<GraphNode>) -> Result<(), SchedulerError> {
        let result = self.scan_inner(state, start);
        self.check_finish_scope(state);
        result
    }

    fn scan_inner(self: &Arc<Self>, state: &mut State, start: Option<GraphNode>) -> Result<(), SchedulerError> {
        let mut cursor = start;
        loop {
            let node = match cursor.take() {
                Some(n) => n,
                None => match state.fifo.pop_front() {
                    Some(task) => {
                        for (var, value) in task.bindings {
                            state.var_map.seed(var, value);
                        }
                        task.entry
                    }
                    None => return Ok(()),
                },
            };

            let is_branch = matches!(node.kind(), Kind::Branch(_));
            let sched = self.build_schedule_node(state, node.clone())?;
            let id = sched.id;
            let dep_count = sched.dep_count;
            state.nodes.insert(id, sched);

            if is_branch {
                if dep_count == 0 {
                    self.resolve_branch_locked(state, id);
                }
                return Ok(());
            }

            state.window_size += 1;
            if dep_count == 0 {
                self.start_locked(state, id);
            }
            cursor = node.next(0);
        }
    }

    fn build_schedule_node(self: &Arc<Self>, state: &mut State, node: GraphNode) -> Result<ScheduleNode, SchedulerError> {
        let mut sched = ScheduleNode::new(node.clone());
        let mut seen_vars: HashMap<Var, bool> = HashMap::new();
        let mut dep_count: u32 = 0;

        for item in node.read_set() {
            match item {
                ReadItem::Var { var, readonly } => {
                    if let Some(prev) = seen_vars.get(var) {
                        if *prev != *readonly {
                            return Err(SchedulerError::ConflictingAccessMode);
                        }
                    } else {
                        seen_vars.insert(*var, *readonly);
                    }
                    match state.var_map.get(*var) {
                        None => return Err(SchedulerError::UseBeforeDefine(*var)),
                        Some(Binding::Producer(producer)) => {
                            let producer = *producer;
                            dep_count += 1;
                            if let Some(p) = state.nodes.get_mut(&producer) {
                                p.add_waiter(*var, Waiter { node: sched.id, reader: *readonly });
                            }
                        }
                        Some(Binding::Value(value)) => {
                            let value = value.clone();
                            if let Some(handle) = value.as_mutable() {
                                let (root, _owner) = mutable::find(handle);
                                if register_access(&mut state.scoreboard, &mut sched, &root, *readonly) {
                                    dep_count += 1;
                                }
                            }
                            sched.in_map.insert(*var, value);
                        }
                    }
                }
                ReadItem::Mutable { handle, readonly } => {
                    let (root, _owner) = mutable::find(handle);
                    if register_access(&mut state.scoreboard, &mut sched, &root, *readonly) {
                        dep_count += 1;
                    }
                }
            }
        }
        sched.dep_count = dep_count;

        for var in node.write_set() {
            state.var_map.set_producer(*var, sched.id);
        }

        Ok(sched)
    }

    fn resolve_branch_locked(self: &Arc<Self>, state: &mut State, id: ScheduleNodeId) {
        let node = state.nodes.remove(&id).expect("branch schedule node must still be registered");
        let condition = match node.graph_node.kind() {
            Kind::Branch(spec) => spec.condition,
            _ => unreachable!("resolve_branch_locked called on a non-branch node"),
        };
        let truthy = matches!(node.in_map.get(&condition), Some(Value::Bool(true)));
        // `if_else`/`do_while` wire `next(0)` to the then/loop-again arm
        // and `next(1)` to the else/exit arm - the opposite of
        // `original_source`'s literal `1 if cond else 0` (see DESIGN.md).
        let edge = if truthy { 0 } else { 1 };
        let target = node.graph_node.next(edge);

        let mut woken = Vec::new();
        for root in node.refs.keys() {
            woken.extend(state.scoreboard.remove_waiter(root.key(), id));
        }

        if state.window_size >= self.config.max_window {
            state.window_stall = target;
        } else if let Some(target) = target {
            let _ = self.scan_inner(state, Some(target));
        }

        for w in woken {
            self.dec_dep_count_locked(state, w);
        }
    }

    fn resume_stall_if_possible(self: &Arc<Self>, state: &mut State) {
        if state.window_stall.is_some() && state.window_size < self.config.max_window {
            let target = state.window_stall.take();
            let _ = self.scan_inner(state, target);
        }
    }

    // ---- dispatch --------------------------------------------------------

    fn start_locked(self: &Arc<Self>, state: &mut State, id: ScheduleNodeId) {
        if let Some(node) = state.nodes.get(&id) {
            for root in node.refs.keys() {
                mutable::set_owning_task(root, id);
            }
        }

        let kind = match state.nodes.get(&id) {
            Some(node) => node.graph_node.kind().clone(),
            None => return,
        };

        match kind {
            Kind::Branch(_) => self.resolve_branch_locked(state, id),
            Kind::VarWait => self.complete_locked(state, id, TaskOutcome::Values(Vec::new())),
            Kind::Signal(slot) => {
                let value = state.nodes.get(&id).and_then(|n| n.in_map.values().next().cloned()).unwrap_or(Value::Unit);
                *slot.result.lock().unwrap() = Some(value);
                slot.cond.notify_all();
                self.complete_locked(state, id, TaskOutcome::Values(Vec::new()));
            }
            Kind::Nested(spec) => {
                let (in_map, write_set) = {
                    let node = state.nodes.get(&id).unwrap();
                    (node.in_map.clone(), node.graph_node.write_set().to_vec())
                };
                self.log_task(agentflow_logging::TaskEvent::Started { id: id.raw() });
                let child = Scheduler::new_child(self.clone(), id, write_set);
                let pair = GraphPair { start: spec.entry.clone(), end: spec.entry };
                child.add_task(pair, in_map).expect("nested scope graph is internally inconsistent");
            }
            Kind::Sync(spec) => {
                let inputs = state.nodes.get(&id).unwrap().in_map.clone();
                self.log_task(agentflow_logging::TaskEvent::Started { id: id.raw() });
                let job = SyncJob { body: spec.body, inputs };
                self.executor.thread_queue_item(Box::new(job), id, self.clone());
            }
            Kind::Llm(spec) => {
                let inputs = state.nodes.get(&id).unwrap().in_map.clone();
                let write_set = state.nodes.get(&id).unwrap().graph_node.write_set().to_vec();
                self.log_task(agentflow_logging::TaskEvent::Started { id: id.raw() });
                let job = LlmJob { spec, inputs, write_set, model_client: self.model_client.clone() };
                self.executor.queue_item(Box::new(job), id, self.clone());
            }
        }
    }

    // ---- completion ------------------------------------------------------

    /// Reports that `id` ran (or failed) with `outcome`, called by a
    /// `SyncJob`/`LlmJob` once its task body returns, or by a
    /// finishing child scope reporting back to its parent node.
    fn node_completed(self: &Arc<Self>, id: ScheduleNodeId, outcome: TaskOutcome) {
        let mut state = self.state.lock();
        self.complete_locked(&mut state, id, outcome);
    }

    fn complete_locked(self: &Arc<Self>, state: &mut State, id: ScheduleNodeId, outcome: TaskOutcome) {
        let Some(node) = state.nodes.remove(&id) else { return };
        state.window_size = state.window_size.saturating_sub(1);

        let out_map = self.build_out_map(&node, outcome);
        let failed = out_map.values().any(Value::is_error);
        self.log_task(agentflow_logging::TaskEvent::Completed { id: id.raw(), failed });

        for (var, value) in out_map {
            if let Some(waiters) = node.wait_map.get(&var) {
                for waiter in waiters.clone() {
                    self.deliver_locked(state, waiter.node, var, value.clone(), waiter.reader);
                }
            }
            state.var_map.resolve(var, id, value);
        }

        let mut woken = Vec::new();
        for root in node.refs.keys() {
            woken.extend(state.scoreboard.remove_waiter(root.key(), id));
        }
        for w in woken {
            self.dec_dep_count_locked(state, w);
        }

        self.resume_stall_if_possible(state);
        self.check_finish_scope(state);
    }

    fn build_out_map(&self, node: &ScheduleNode, outcome: TaskOutcome) -> HashMap<Var, Value> {
        match outcome {
            TaskOutcome::Values(values) => node.graph_node.write_set().iter().copied().zip(values).collect(),
            TaskOutcome::Failed(msg) => {
                node.graph_node.write_set().iter().copied().map(|v| (v, Value::Error(msg.clone()))).collect()
            }
            TaskOutcome::NestedOutputs(map) => map,
        }
    }

    fn deliver_locked(self: &Arc<Self>, state: &mut State, waiter_id: ScheduleNodeId, var: Var, value: Value, reader: bool) {
        let handle = value.as_mutable().cloned();
        match state.nodes.get_mut(&waiter_id) {
            Some(w) => {
                w.in_map.insert(var, value);
            }
            None => return,
        }
        let added_dep = match handle {
            Some(h) => register_access_for(state, waiter_id, &h, reader),
            None => false,
        };
        if !added_dep {
            self.dec_dep_count_locked(state, waiter_id);
        }
    }

    fn dec_dep_count_locked(self: &Arc<Self>, state: &mut State, id: ScheduleNodeId) {
        let ready = match state.nodes.get_mut(&id) {
            Some(n) => {
                n.dep_count = n.dep_count.saturating_sub(1);
                n.dep_count == 0
            }
            None => false,
        };
        if ready {
            self.start_locked(state, id);
        }
    }

    fn check_finish_scope(self: &Arc<Self>, state: &mut State) {
        if state.window_size != 0 || !state.fifo.is_empty() || state.window_stall.is_some() {
            return;
        }
        match &self.link {
            None => {
                self.idle.notify_all();
            }
            Some(_) => {
                if state.finished {
                    return;
                }
                state.finished = true;
                let link = self.link.as_ref().unwrap();
                let out_map: HashMap<Var, Value> = link
                    .write_set
                    .iter()
                    .map(|v| {
                        let value = match state.var_map.get(*v) {
                            Some(Binding::Value(value)) => value.clone(),
                            _ => Value::Error("nested scope finished without resolving a declared output".to_string()),
                        };
                        (*v, value)
                    })
                    .collect();
                let parent = link.parent.clone();
                let parent_node = link.parent_node;
                self.log_task(agentflow_logging::TaskEvent::Completed { id: self.scope_id(), failed: false });
                self.log_scope(agentflow_logging::ScopeEvent::Finished { scope_id: self.scope_id() as usize });
                parent.node_completed(parent_node, TaskOutcome::NestedOutputs(out_map));
            }
        }
    }
}
