//! Queued user submissions awaiting a scan.

use std::collections::HashMap;

use crate::graph::GraphNode;
use crate::var::{Value, Var};

/// "The user submitted this graph entry with this initial variable
/// binding" - an element of a scheduler's FIFO of work handed to it
/// but not yet scanned.
pub struct TaskNode {
    /// Entry point of the graph to scan.
    pub entry: GraphNode,
    /// Values pre-bound in the scope's variable map before scanning
    /// begins (e.g. a nested scope's inputs, copied from its parent
    /// task's `in_map`).
    pub bindings: HashMap<Var, Value>,
}

impl TaskNode {
    /// Builds a task node with no initial bindings.
    pub fn new(entry: GraphNode) -> Self {
        TaskNode { entry, bindings: HashMap::new() }
    }

    /// Builds a task node seeded with initial bindings.
    pub fn with_bindings(entry: GraphNode, bindings: HashMap<Var, Value>) -> Self {
        TaskNode { entry, bindings }
    }
}
