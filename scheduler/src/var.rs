//! Logical variables and the dynamically-typed values that flow along
//! them.
//!
//! A [`Var`] is deliberately inert: it carries no data of its own,
//! only enough identity to be a hashmap key. All the interesting
//! behavior - "is this variable bound yet", "who produces it", "is it
//! a mutable reference" - lives in the scheduler's per-scope variable
//! map ([`VarMap`]) and in the [`Value`] it eventually resolves to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::mutable::MutableHandle;
use crate::scheduling::ScheduleNodeId;

static NEXT_VAR: AtomicU64 = AtomicU64::new(1);

/// An opaque token identifying a dataflow edge.
///
/// Two `Var`s are equal only if one was cloned from the other; there
/// is no structural equality, matching the source's reference-identity
/// variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(u64);

impl Var {
    /// Allocates a fresh, globally unique variable.
    pub fn new() -> Self {
        Var(NEXT_VAR.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Var {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a [`Var`] to declare that a task will only read the mutable
/// it may refer to, never write it.
///
/// `ReadOnly` exists purely as a marker consumed by [`crate::graph`]
/// builder functions when they assemble a node's read set; by the time
/// a [`crate::scheduling::ScheduleNode`] runs, the distinction has
/// already been folded into a reader registration on the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadOnly(pub Var);

/// A reference handed to a running task body that can observe a
/// mutable but cannot mutate it at the type level.
///
/// This is the runtime counterpart of [`ReadOnly`]: where `ReadOnly`
/// marks a variable at graph-construction time, `ReadOnlyProxy` is
/// what a task body actually holds once the scheduler has resolved
/// that variable to a value.
#[derive(Clone)]
pub struct ReadOnlyProxy(MutableHandle);

impl ReadOnlyProxy {
    /// Wraps a mutable handle as a read-only proxy.
    pub fn new(handle: MutableHandle) -> Self {
        ReadOnlyProxy(handle)
    }

    /// Returns the underlying handle for use by collaborators that
    /// only need identity (e.g. registering it with the scoreboard),
    /// not mutation.
    pub fn handle(&self) -> &MutableHandle {
        &self.0
    }
}

/// A value flowing along a [`Var`]: either data the scheduler treats
/// as opaque, or a reference to a [`MutableHandle`].
///
/// This is the Rust rendering of the source's dynamically-typed
/// values; agent programs are expected to be small and
/// interpreter-adjacent, so a closed sum type stands in for arbitrary
/// Python objects without losing the one distinction the scheduler
/// actually cares about - "is this a mutable reference".
#[derive(Debug, Clone)]
pub enum Value {
    /// No value (the result of a task with no outputs).
    Unit,
    /// A boolean, used by branch conditions.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A UTF-8 string.
    Str(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(HashMap<String, Value>),
    /// A reference to a mutable object.
    Mutable(MutableHandle),
    /// The error sentinel forwarded in place of a task's real output
    /// when its body failed.
    Error(String),
}

impl Value {
    /// Returns the mutable this value refers to, if any.
    pub fn as_mutable(&self) -> Option<&MutableHandle> {
        match self {
            Value::Mutable(handle) => Some(handle),
            _ => None,
        }
    }

    /// True if this value is the error sentinel.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

/// What a scope's variable map entry currently points at: either the
/// schedule node that will eventually produce the variable, or the
/// value it already resolved to.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Not yet produced; `ScheduleNodeId` is the producer a reader
    /// should register a wait against.
    Producer(ScheduleNodeId),
    /// Already resolved.
    Value(Value),
}

/// A scope's identity-keyed variable map: `Var -> {producer | value}`.
///
/// Mirrors the source's per-scheduler dict keyed by variable identity;
/// `Var`'s `Hash`/`Eq` impls already give reference-identity semantics
/// so a plain `HashMap` is a direct translation.
#[derive(Debug, Default)]
pub struct VarMap {
    bindings: HashMap<Var, Binding>,
}

impl VarMap {
    /// Builds an empty variable map, optionally seeded with initial
    /// bindings (as when a nested scope inherits its parent's
    /// `in_map`).
    pub fn new() -> Self {
        VarMap { bindings: HashMap::new() }
    }

    /// Seeds the map with a resolved value, as when a nested
    /// scheduler's variable map is initialized from its parent task's
    /// `in_map`.
    pub fn seed(&mut self, var: Var, value: Value) {
        self.bindings.insert(var, Binding::Value(value));
    }

    /// Looks up the current binding for `var`.
    pub fn get(&self, var: Var) -> Option<&Binding> {
        self.bindings.get(&var)
    }

    /// Records that `producer` will eventually bind `var`.
    pub fn set_producer(&mut self, var: Var, producer: ScheduleNodeId) {
        self.bindings.insert(var, Binding::Producer(producer));
    }

    /// Resolves `var` to a value, replacing a producer binding.
    ///
    /// Returns `true` if the map's entry for `var` was still pointing
    /// at `producer` (the caller uses this to decide whether to
    /// publish the value, matching the scan-phase note "if the
    /// scheduler's variable map entry still points at `s`, replace it
    /// with the value").
    pub fn resolve(&mut self, var: Var, producer: ScheduleNodeId, value: Value) -> bool {
        let still_current = matches!(
            self.bindings.get(&var),
            Some(Binding::Producer(p)) if *p == producer
        );
        if still_current {
            self.bindings.insert(var, Binding::Value(value));
        }
        still_current
    }

    /// True if `var` has never been bound in this scope.
    pub fn is_unbound(&self, var: Var) -> bool {
        !self.bindings.contains_key(&var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_vars_are_not_equal() {
        assert_ne!(Var::new(), Var::new());
    }

    #[test]
    fn var_map_round_trips_a_value() {
        let mut map = VarMap::new();
        let v = Var::new();
        assert!(map.is_unbound(v));
        map.seed(v, Value::Int(7));
        match map.get(v) {
            Some(Binding::Value(Value::Int(7))) => {}
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn resolve_only_publishes_if_still_current() {
        let mut map = VarMap::new();
        let v = Var::new();
        let producer = ScheduleNodeId::new_for_test(1);
        let stale_producer = ScheduleNodeId::new_for_test(2);
        map.set_producer(v, producer);
        assert!(!map.resolve(v, stale_producer, Value::Int(1)));
        assert!(map.resolve(v, producer, Value::Int(2)));
        match map.get(v) {
            Some(Binding::Value(Value::Int(2))) => {}
            other => panic!("unexpected binding: {other:?}"),
        }
    }
}
