//! Runtime instances of graph nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::GraphNode;
use crate::mutable::MutableHandle;
use crate::var::{Value, Var};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A schedule node's identity and its position in a scope's order.
///
/// Ids are allocated from a single process-wide counter: the
/// specification only requires ordering *within* a scope, and a
/// global counter trivially satisfies that while also giving every
/// schedule node in the process a unique id, which simplifies using
/// `ScheduleNodeId` as a scoreboard key and as the `dummy_task`
/// sentinel's natural complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleNodeId(u64);

impl ScheduleNodeId {
    /// The sentinel meaning "detached from any running task".
    pub const DUMMY: ScheduleNodeId = ScheduleNodeId(0);

    /// Allocates a fresh, strictly increasing id.
    pub(crate) fn fresh() -> Self {
        ScheduleNodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// True if this is the dummy/detached sentinel.
    pub fn is_dummy(self) -> bool {
        self == Self::DUMMY
    }

    /// Raw numeric id, exposed for logging.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Builds an id with a specific value for use in unit tests that
    /// need deterministic, hand-picked ids (e.g. scoreboard ordering
    /// tests). Never used by the scheduler itself, which always
    /// allocates via [`ScheduleNodeId::fresh`].
    #[cfg(test)]
    pub fn new_for_test(id: u64) -> Self {
        ScheduleNodeId(id)
    }
}

/// Whether a scoreboard registration was made for a reader or a
/// writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The task only observes the mutable.
    Read,
    /// The task observes and may mutate the mutable.
    Write,
}

/// A downstream schedule node waiting on one of our output variables.
#[derive(Debug, Clone)]
pub struct Waiter {
    /// The waiting schedule node.
    pub node: ScheduleNodeId,
    /// Whether it will only read the variable's mutable, if any.
    pub reader: bool,
}

/// The runtime instance of a [`GraphNode`].
///
/// Holds everything the scan and completion phases need: resolved and
/// pending inputs (`in_map`), the downstream nodes waiting on each
/// output variable (`wait_map`), the ownership roots this instance has
/// registered with the scoreboard (`refs`), and - once it has run -
/// its outputs (`out_map`).
pub struct ScheduleNode {
    /// Monotonically increasing identifier; fixes this node's order
    /// within its scope.
    pub id: ScheduleNodeId,
    /// The static graph node this is an instance of.
    pub graph_node: GraphNode,
    /// Outstanding dependence count; the node fires when this reaches
    /// zero.
    pub dep_count: u32,
    /// Resolved or pending inputs.
    pub in_map: HashMap<Var, Value>,
    /// Downstream waiters per output variable.
    pub wait_map: HashMap<Var, Vec<Waiter>>,
    /// Ownership roots registered against the scoreboard, with the
    /// access mode under which they were registered.
    pub refs: HashMap<MutableHandle, Access>,
    /// Outputs, set on completion.
    pub out_map: HashMap<Var, Value>,
}

impl ScheduleNode {
    /// Creates a fresh runtime instance for `graph_node`, allocating a
    /// new id.
    pub fn new(graph_node: GraphNode) -> Self {
        ScheduleNode {
            id: ScheduleNodeId::fresh(),
            graph_node,
            dep_count: 0,
            in_map: HashMap::new(),
            wait_map: HashMap::new(),
            refs: HashMap::new(),
            out_map: HashMap::new(),
        }
    }

    /// Records that `waiter` is waiting for our output of `var`.
    pub fn add_waiter(&mut self, var: Var, waiter: Waiter) {
        self.wait_map.entry(var).or_default().push(waiter);
    }
}
