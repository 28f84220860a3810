//! Mutable objects and the ownership union-find over them.
//!
//! Grounded on the source's `Mutable` base class: every mutable heap
//! object carries an `_owner` (another mutable, or the task that
//! currently holds it) and a `_size` used for union-by-size. `find`
//! walks `_owner` links to the ownership root - the mutable whose
//! owner is a task rather than another mutable - compressing the path
//! as it goes.
//!
//! The union-find itself is pure data manipulation and does not block;
//! the blocking half of the contract (`wait_for_access`) lives on
//! [`crate::scheduling::Scheduler`], which has the condition variables
//! and work-stealing logic the wait requires.

use std::cell::Cell;
use std::sync::{Arc, Mutex};

use crate::scheduling::ScheduleNodeId;

thread_local! {
    /// The schedule node currently executing on this worker thread, if
    /// any. Set immediately before a task body is dispatched and
    /// cleared on return; the Rust rendering of the source's
    /// thread-local "current task" context (section 9).
    static CURRENT_TASK: Cell<Option<ScheduleNodeId>> = const { Cell::new(None) };
}

/// Installs `task` as the current task for the duration of `body`.
pub fn with_current_task<R>(task: ScheduleNodeId, body: impl FnOnce() -> R) -> R {
    let previous = CURRENT_TASK.with(|cell| cell.replace(Some(task)));
    let result = body();
    CURRENT_TASK.with(|cell| cell.set(previous));
    result
}

/// Returns the task currently executing on this worker thread, or the
/// dummy task if none is set (e.g. code running outside any schedule
/// node's dispatch, such as test setup).
pub fn current_task() -> ScheduleNodeId {
    CURRENT_TASK.with(|cell| cell.get()).unwrap_or(ScheduleNodeId::DUMMY)
}

/// A mutable object's ownership bookkeeping, shared via [`MutableHandle`].
struct MutableCore {
    owner: Owner,
    size: usize,
}

/// Who (or what) currently owns a mutable.
#[derive(Clone)]
pub enum Owner {
    /// Owned directly by a schedule node (including the `dummy_task`
    /// sentinel, meaning "detached from any running task").
    Task(ScheduleNodeId),
    /// A non-root node in the ownership tree: owned by another
    /// mutable, which must itself be looked up via `find`.
    Object(MutableHandle),
}

/// A cloneable, thread-safe handle to a mutable object's ownership
/// node.
///
/// Concrete reference collaborators ([`crate::objects::Counter`],
/// [`crate::objects::FileStore`], [`crate::objects::ProcessAgent`],
/// [`crate::objects::Conversation`]) each embed one of these to
/// participate in the ownership tree and the scoreboard, the same way
/// the source's concrete subclasses inherit `Mutable`'s `_owner`
/// bookkeeping rather than reimplementing it.
#[derive(Clone)]
pub struct MutableHandle(Arc<Mutex<MutableCore>>);

impl MutableHandle {
    /// Creates a new mutable, initially owned by the given task (use
    /// [`ScheduleNodeId::DUMMY`] for objects constructed outside any
    /// task body).
    pub fn new(owner: ScheduleNodeId) -> Self {
        MutableHandle(Arc::new(Mutex::new(MutableCore { owner: Owner::Task(owner), size: 1 })))
    }

    /// Creates a new mutable owned by whichever task is currently
    /// executing on this thread (or the dummy task outside one).
    pub fn new_owned_by_current_task() -> Self {
        Self::new(current_task())
    }

    /// Identity key suitable for use as a scoreboard / hash-map key.
    /// Two handles compare equal under this key iff they are the same
    /// underlying object.
    pub fn key(&self) -> MutableKey {
        MutableKey(Arc::as_ptr(&self.0) as usize)
    }

    fn size(&self) -> usize {
        self.0.lock().unwrap().size
    }
}

impl PartialEq for MutableHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for MutableHandle {}

impl std::hash::Hash for MutableHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Debug for MutableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MutableHandle({:#x})", self.key().0)
    }
}

/// An identity-comparable, hashable key for a [`MutableHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutableKey(usize);

/// Walks `owner` links from `handle` to its ownership root, compressing
/// the path as it goes.
///
/// Returns the root handle and the task that currently owns it. The
/// teacher crate has no analogue for this (it has no heap ownership
/// model at all); this is grounded directly on `Mutable.getRootObject`
/// in the source, translated from an in-place mutating walk to one
/// that rewrites intermediate links through the shared `Mutex`.
pub fn find(handle: &MutableHandle) -> (MutableHandle, ScheduleNodeId) {
    let mut path = Vec::new();
    let mut current = handle.clone();
    let (root, owner) = loop {
        let next = {
            let core = current.0.lock().unwrap();
            match &core.owner {
                Owner::Task(task) => break (current.clone(), *task),
                Owner::Object(parent) => parent.clone(),
            }
        };
        path.push(current);
        current = next;
    };
    for node in path {
        if node != root {
            node.0.lock().unwrap().owner = Owner::Object(root.clone());
        }
    }
    (root, owner)
}

/// Directly rebinds an ownership-root mutable to a task.
///
/// Used when the scheduler transfers ownership into a newly-firing
/// schedule node, or detaches a mutable by setting its owner to the
/// dummy task. Panics if `root` is not actually a root; callers are
/// expected to have just called [`find`].
pub fn set_owning_task(root: &MutableHandle, task: ScheduleNodeId) {
    let mut core = root.0.lock().unwrap();
    debug_assert!(matches!(core.owner, Owner::Task(_)), "set_owning_task called on a non-root mutable");
    core.owner = Owner::Task(task);
}

/// Unions the ownership trees rooted at `child` and `parent`.
///
/// Union-by-size: the larger tree's root wins and absorbs the smaller
/// (if `child`'s root is larger, the roles are swapped, matching the
/// source's `setOwningObject`). Returns the winning root and the
/// absorbed root, so the caller (the scheduler, which holds the
/// scoreboard) can merge their access queues.
///
/// Callers must already have established, via `wait_for_access` on
/// both roots, that no task holds a conflicting reference; this
/// function only performs the pointer rewrite and size bookkeeping.
pub fn union(child: &MutableHandle, parent: &MutableHandle) -> (MutableHandle, MutableHandle) {
    let (mut child_root, _) = find(child);
    let (mut parent_root, _) = find(parent);
    if child_root == parent_root {
        return (parent_root, child_root);
    }
    if child_root.size() > parent_root.size() {
        std::mem::swap(&mut child_root, &mut parent_root);
    }
    let absorbed_size = child_root.size();
    {
        let mut core = child_root.0.lock().unwrap();
        core.owner = Owner::Object(parent_root.clone());
    }
    {
        let mut core = parent_root.0.lock().unwrap();
        core.size += absorbed_size;
    }
    (parent_root, child_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64) -> ScheduleNodeId {
        ScheduleNodeId::new_for_test(id)
    }

    #[test]
    fn fresh_mutable_is_its_own_root() {
        let m = MutableHandle::new(task(1));
        let (root, owner) = find(&m);
        assert_eq!(root, m);
        assert_eq!(owner, task(1));
    }

    #[test]
    fn union_makes_the_larger_tree_win() {
        let a = MutableHandle::new(task(1));
        let b = MutableHandle::new(task(2));
        // Grow `a`'s tree so it is strictly larger than `b`'s.
        let c = MutableHandle::new(task(1));
        let (winner, _) = union(&c, &a);
        assert_eq!(winner, a);

        let (root, _) = union(&b, &a);
        assert_eq!(root, a, "larger tree must win union by size");
        assert_eq!(find(&b).0, a);
        assert_eq!(find(&c).0, a);
    }

    #[test]
    fn path_compression_points_directly_at_root() {
        let a = MutableHandle::new(task(1));
        let b = MutableHandle::new(task(2));
        let c = MutableHandle::new(task(3));
        let (root_ab, _) = union(&b, &a);
        let (root_abc, _) = union(&c, &root_ab);
        assert_eq!(find(&c).0, root_abc);
        assert_eq!(find(&b).0, root_abc);
    }

    #[test]
    fn set_owning_task_rebinds_root() {
        let m = MutableHandle::new(task(1));
        set_owning_task(&m, ScheduleNodeId::DUMMY);
        assert_eq!(find(&m).1, ScheduleNodeId::DUMMY);
    }
}
