//! The static graph model: immutable nodes linked by logical
//! variables, built once by user code and then walked repeatedly by
//! `scan` (once per iteration, for nodes inside a loop body).
//!
//! Grounded on the source's `GraphNode` hierarchy and its builder
//! functions (`createLLMAgent`, `createPythonAgent`, `createSequence`,
//! `createIfElse`, `createDoWhile`, `createRunnable`). Rather than an
//! inheritance hierarchy this models the node kinds as a tagged
//! variant, per the specification's design note in section 9.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::mutable::MutableHandle;
use crate::msgseq::MsgSeq;
use crate::scheduling::{ScheduleNodeId, Scheduler};
use crate::tools::ToolList;
use crate::var::{Value, Var};
use crate::error::SchedulerError;

/// One entry in a node's declared read set.
#[derive(Clone)]
pub enum ReadItem {
    /// A logical variable; `readonly` mirrors whether it arrived
    /// wrapped in `ReadOnly`.
    Var { var: Var, readonly: bool },
    /// A mutable referenced directly (not via a variable), as when a
    /// task closes over a mutable from its construction scope.
    Mutable { handle: MutableHandle, readonly: bool },
}

/// A task body's resolved inputs: every variable named in its
/// `read_set`, mapped to the value it resolved to. Closures built by
/// [`python_agent`] / [`llm_agent`] callers already know which `Var`s
/// they care about (they captured the tokens when building the node),
/// so there is no need for a separate positional/keyword calling
/// convention the way the source's dynamically-dispatched `args`/
/// `kwargs` needed one.
pub type ResolvedInputs = HashMap<Var, Value>;

/// The body of an opaque synchronous ("python agent") task.
///
/// Receives its resolved inputs and a handle to the scheduler that
/// will run it (so it may itself submit a nested graph, matching the
/// source's ability for a python agent to drive a child scheduler),
/// and returns its declared outputs in the order of the node's
/// `write_set`.
pub type SyncAgentFn =
    Arc<dyn Fn(&ResolvedInputs, &Scheduler) -> Result<Vec<Value>, SchedulerError> + Send + Sync>;

/// Static description of an LLM agent node.
#[derive(Clone)]
pub struct LlmSpec {
    /// Conversation mutable to append to and read from, if any.
    pub conversation: Option<Var>,
    /// Tools exposed to the model for this call, if any.
    pub tools: Option<Arc<ToolList>>,
    /// Builds the outgoing message list from resolved inputs.
    pub messages: Arc<dyn MsgSeq>,
}

/// Static description of a synchronous agent node.
#[derive(Clone)]
pub struct SyncSpec {
    /// The task body.
    pub body: SyncAgentFn,
}

/// Static description of a nested-scope node: a whole sub-graph that
/// runs under its own child scheduler.
#[derive(Clone)]
pub struct NestedSpec {
    /// Entry point of the nested graph.
    pub entry: GraphNode,
}

/// Static description of a two-way branch.
#[derive(Clone)]
pub struct BranchSpec {
    /// The boolean condition variable.
    pub condition: Var,
}

/// The kind-specific payload of a graph node.
#[derive(Clone)]
pub enum Kind {
    /// An asynchronous call to a remote model.
    Llm(LlmSpec),
    /// An opaque, possibly long-running synchronous task.
    Sync(SyncSpec),
    /// A nested scope.
    Nested(NestedSpec),
    /// A synthetic join node used by `if_else`/`do_while` to give both
    /// arms of a branch a single point to converge on; it has no body
    /// and no read/write set of its own.
    VarWait,
    /// A synthetic node used by `Scheduler::read_variable` and
    /// `Scheduler::obj_access`: firing is itself the signal that the
    /// blocked caller is waiting for, so its body just stashes the
    /// resolved value into `slot` and wakes anyone parked on it.
    Signal(Arc<VarWaitSlot>),
    /// A two-way branch.
    Branch(BranchSpec),
}

/// The handoff point between a blocked caller and the `Signal` node
/// scanned on its behalf. The caller parks on `cond` until the
/// scheduler, running under its own lock, fills in `result` and wakes
/// it - the same shape as the source's `asyncio.Event`-per-wait, just
/// built from `std::sync` primitives since the caller here is an
/// ordinary blocked thread, not a coroutine.
pub struct VarWaitSlot {
    /// The resolved value, filled in once the signal node fires.
    pub result: Mutex<Option<Value>>,
    /// Notified once `result` is filled in.
    pub cond: Condvar,
}

impl VarWaitSlot {
    /// Builds an empty, not-yet-signaled slot.
    pub fn new() -> Arc<Self> {
        Arc::new(VarWaitSlot { result: Mutex::new(None), cond: Condvar::new() })
    }
}

struct GraphNodeData {
    read_set: Vec<ReadItem>,
    write_set: Vec<Var>,
    kind: Kind,
    next: Mutex<[Option<GraphNode>; 2]>,
}

/// An immutable, reference-counted static graph node.
///
/// Cloning a `GraphNode` is cheap (an `Arc` bump); the same static
/// node may be visited more than once at runtime inside a loop body,
/// each visit producing a fresh
/// [`ScheduleNode`](crate::scheduling::ScheduleNode).
#[derive(Clone)]
pub struct GraphNode(Arc<GraphNodeData>);

impl GraphNode {
    fn leaf(read_set: Vec<ReadItem>, write_set: Vec<Var>, kind: Kind) -> Self {
        GraphNode(Arc::new(GraphNodeData {
            read_set,
            write_set,
            kind,
            next: Mutex::new([None, None]),
        }))
    }

    /// This node's declared read set.
    pub fn read_set(&self) -> &[ReadItem] {
        &self.0.read_set
    }

    /// This node's declared write set.
    pub fn write_set(&self) -> &[Var] {
        &self.0.write_set
    }

    /// This node's kind-specific payload.
    pub fn kind(&self) -> &Kind {
        &self.0.kind
    }

    /// The successor to continue scanning from (`next[0]` for every
    /// kind but a resolved branch, which uses `next[1]` on the
    /// opposite edge).
    pub fn next(&self, edge: usize) -> Option<GraphNode> {
        self.0.next.lock().unwrap()[edge].clone()
    }

    fn set_next(&self, edge: usize, node: GraphNode) {
        self.0.next.lock().unwrap()[edge] = Some(node);
    }

    /// Identity comparison, used by the scheduler when it must
    /// recognize "the same static node" across loop iterations.
    pub fn same_node(&self, other: &GraphNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A built subgraph's entry and exit points.
///
/// Every builder function returns one of these; `sequence` and the
/// `|` combinator link a pair's end to the next pair's start.
#[derive(Clone)]
pub struct GraphPair {
    /// First node to scan.
    pub start: GraphNode,
    /// Last node scanned along the pair's primary edge; its `next[0]`
    /// is still unset and is where a following pair gets linked.
    pub end: GraphNode,
}

impl GraphPair {
    /// Concatenates `self` followed by `other`, linking `self.end`'s
    /// primary successor to `other.start`.
    pub fn then(self, other: GraphPair) -> GraphPair {
        self.end.set_next(0, other.start.clone());
        GraphPair { start: self.start, end: other.end }
    }
}

impl std::ops::BitOr for GraphPair {
    type Output = GraphPair;
    /// The `a | b` sequencing combinator from the public surface.
    fn bitor(self, rhs: GraphPair) -> GraphPair {
        self.then(rhs)
    }
}

/// Builds an LLM agent node.
///
/// `out` receives the model's reply; reading it elsewhere in the graph
/// sequences after this call completes.
pub fn llm_agent(
    out: Var,
    conversation: Option<Var>,
    tools: Option<Arc<ToolList>>,
    messages: Arc<dyn MsgSeq>,
    reads: Vec<ReadItem>,
) -> GraphPair {
    let mut read_set = reads;
    if let Some(conv) = conversation {
        read_set.push(ReadItem::Var { var: conv, readonly: false });
    }
    let node = GraphNode::leaf(
        read_set,
        vec![out],
        Kind::Llm(LlmSpec { conversation, tools, messages }),
    );
    GraphPair { start: node.clone(), end: node }
}

/// Builds an opaque synchronous agent node.
pub fn python_agent(body: SyncAgentFn, reads: Vec<ReadItem>, outs: Vec<Var>) -> GraphPair {
    let node = GraphNode::leaf(reads, outs, Kind::Sync(SyncSpec { body }));
    GraphPair { start: node.clone(), end: node }
}

/// Builds a nested-scope node wrapping `entry`.
pub fn nested(entry: GraphPair, reads: Vec<ReadItem>, write_set: Vec<Var>) -> GraphPair {
    let node = GraphNode::leaf(reads, write_set, Kind::Nested(NestedSpec { entry: entry.start }));
    GraphPair { start: node.clone(), end: node }
}

/// Builds a one-shot synthetic node that signals `slot` once its
/// single read item resolves, for `Scheduler::read_variable` and
/// `Scheduler::obj_access` to park on.
pub fn var_wait(read: ReadItem, slot: Arc<VarWaitSlot>) -> GraphPair {
    let node = GraphNode::leaf(vec![read], Vec::new(), Kind::Signal(slot));
    GraphPair { start: node.clone(), end: node }
}

/// Concatenates a list of pairs in order, matching the source's
/// `createSequence`.
pub fn sequence(pairs: Vec<GraphPair>) -> GraphPair {
    let mut iter = pairs.into_iter();
    let first = iter.next().expect("sequence() requires at least one element");
    iter.fold(first, |acc, next| acc.then(next))
}

/// Identity wrapper marking a pair as a standalone submittable unit;
/// kept for surface parity with the source's `createRunnable`, which
/// exists there only to adapt calling convention, not to add behavior.
pub fn runnable(pair: GraphPair) -> GraphPair {
    pair
}

/// Builds a two-way branch: when `condition` resolves, scanning
/// continues from `then_branch` or `else_branch`.
///
/// Grounded in `original_source`'s `createIfElse`; the specification
/// leaves this as an open extension point (section 9) rather than
/// excluding it, so it is implemented as a first-class combinator.
pub fn if_else(condition: Var, then_branch: GraphPair, else_branch: GraphPair) -> GraphPair {
    let branch = GraphNode::leaf(
        vec![ReadItem::Var { var: condition, readonly: true }],
        Vec::new(),
        Kind::Branch(BranchSpec { condition }),
    );
    branch.set_next(0, then_branch.start.clone());
    branch.set_next(1, else_branch.start.clone());
    // Both arms must converge so scanning can continue past the
    // branch; a synthetic no-op join node gives callers one `end` to
    // link onward regardless of which edge was taken.
    let join = GraphNode::leaf(Vec::new(), Vec::new(), Kind::VarWait);
    then_branch.end.set_next(0, join.clone());
    else_branch.end.set_next(0, join.clone());
    GraphPair { start: branch, end: join }
}

/// Builds a do-while loop: `body` runs, then `condition` is checked;
/// while true, `body`'s static subgraph is revisited.
///
/// Grounded in `original_source`'s `createDoWhile`.
pub fn do_while(condition: Var, body: GraphPair) -> GraphPair {
    let branch = GraphNode::leaf(
        vec![ReadItem::Var { var: condition, readonly: true }],
        Vec::new(),
        Kind::Branch(BranchSpec { condition }),
    );
    branch.set_next(0, body.start.clone());
    let exit = GraphNode::leaf(Vec::new(), Vec::new(), Kind::VarWait);
    branch.set_next(1, exit.clone());
    body.end.set_next(0, branch.clone());
    GraphPair { start: body.start, end: exit }
}
