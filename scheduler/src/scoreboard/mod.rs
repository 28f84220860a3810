//! The heap scoreboard: per-mutable ordered access queues that
//! serialize writers and let readers coalesce.
//!
//! Grounded on the source's `ScoreBoard`/`ScoreBoardNode` pair. The
//! source implements the queue as a hand-rolled doubly-linked list of
//! `ScoreBoardNode`s so it can splice in O(1) once the insertion point
//! is known; here the same ordered-list semantics are built on a plain
//! `Vec`, which is simpler to reason about and, given that per-object
//! queues are expected to be short (bounded by a scope's window size),
//! no slower in practice. Every operation below is still the same
//! node-granularity walk-then-splice the source describes.
//!
//! A [`Scoreboard`] is not internally locked: per the concurrency
//! model, every entry is mutated under its owning scheduler's lock, so
//! the scheduler holds one `Scoreboard` per scope and reaches into it
//! while already holding that lock.

use std::collections::HashMap;

use crate::mutable::MutableKey;
use crate::scheduling::ScheduleNodeId;

/// Whether a registration could proceed immediately or must wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The task landed at the head of the queue and may proceed.
    NoConflict,
    /// The task is queued behind another reader group or writer.
    Conflict,
}

/// One element of an ownership root's access queue: either a
/// coalesced group of readers or a single writer, each with an
/// inclusive id range.
#[derive(Debug, Clone)]
enum Node {
    Reader { ids: Vec<ScheduleNodeId>, lo: u64, hi: u64 },
    Writer { id: ScheduleNodeId },
}

impl Node {
    fn reader(id: ScheduleNodeId) -> Self {
        Node::Reader { ids: vec![id], lo: id.raw(), hi: id.raw() }
    }

    fn lo(&self) -> u64 {
        match self {
            Node::Reader { lo, .. } => *lo,
            Node::Writer { id } => id.raw(),
        }
    }

    fn hi(&self) -> u64 {
        match self {
            Node::Reader { hi, .. } => *hi,
            Node::Writer { id } => id.raw(),
        }
    }

    fn contains(&self, task: ScheduleNodeId) -> bool {
        match self {
            Node::Reader { ids, .. } => ids.contains(&task),
            Node::Writer { id } => *id == task,
        }
    }

    fn member_ids(&self) -> Vec<ScheduleNodeId> {
        match self {
            Node::Reader { ids, .. } => ids.clone(),
            Node::Writer { id } => vec![*id],
        }
    }
}

/// Per-object ordered access queues.
#[derive(Default)]
pub struct Scoreboard {
    queues: HashMap<MutableKey, Vec<Node>>,
}

impl Scoreboard {
    /// Creates an empty scoreboard.
    pub fn new() -> Self {
        Scoreboard { queues: HashMap::new() }
    }

    fn queue_mut(&mut self, root: MutableKey) -> &mut Vec<Node> {
        self.queues.entry(root).or_default()
    }

    /// Registers `task` as a reader of `root`.
    pub fn add_reader(&mut self, root: MutableKey, task: ScheduleNodeId) -> Disposition {
        let queue = self.queue_mut(root);
        if queue.is_empty() {
            queue.push(Node::reader(task));
            return Disposition::NoConflict;
        }
        for i in (0..queue.len()).rev() {
            match &queue[i] {
                Node::Writer { id } if id.raw() < task.raw() => {
                    queue.insert(i + 1, Node::reader(task));
                    return Disposition::Conflict;
                }
                Node::Reader { .. } => {
                    let pred_hi = if i == 0 { None } else { Some(queue[i - 1].hi()) };
                    if pred_hi.map_or(true, |hi| hi < task.raw()) {
                        if let Node::Reader { ids, hi, .. } = &mut queue[i] {
                            ids.push(task);
                            *hi = task.raw();
                        }
                        return if i == 0 { Disposition::NoConflict } else { Disposition::Conflict };
                    }
                }
                _ => {}
            }
        }
        unreachable!("scoreboard reached the front without an insertion point for {task:?}");
    }

    /// Registers `task` as the sole writer of `root`.
    pub fn add_writer(&mut self, root: MutableKey, task: ScheduleNodeId) -> Disposition {
        let queue = self.queue_mut(root);
        if queue.is_empty() {
            queue.push(Node::Writer { id: task });
            return Disposition::NoConflict;
        }
        for i in (0..queue.len()).rev() {
            if queue[i].hi() < task.raw() {
                queue.insert(i + 1, Node::Writer { id: task });
                return Disposition::Conflict;
            }
            if let Node::Reader { ids, lo, hi } = &queue[i] {
                if *lo < task.raw() && task.raw() < *hi {
                    let (before, after): (Vec<_>, Vec<_>) =
                        ids.iter().copied().partition(|id| id.raw() < task.raw());
                    let mut replacement = Vec::new();
                    if !before.is_empty() {
                        let lo = before.iter().map(|id| id.raw()).min().unwrap();
                        let hi = before.iter().map(|id| id.raw()).max().unwrap();
                        replacement.push(Node::Reader { ids: before, lo, hi });
                    }
                    replacement.push(Node::Writer { id: task });
                    if !after.is_empty() {
                        let lo = after.iter().map(|id| id.raw()).min().unwrap();
                        let hi = after.iter().map(|id| id.raw()).max().unwrap();
                        replacement.push(Node::Reader { ids: after, lo, hi });
                    }
                    queue.splice(i..=i, replacement);
                    return Disposition::Conflict;
                }
            }
        }
        unreachable!("scoreboard reached the front without an insertion point for {task:?}");
    }

    /// Promotes `task` from reader to writer within its current
    /// reader group, splitting the group if other readers share it.
    pub fn change_to_writer(&mut self, root: MutableKey, task: ScheduleNodeId) -> Disposition {
        let queue = self.queue_mut(root);
        let idx = queue
            .iter()
            .position(|node| node.contains(task))
            .expect("change_to_writer called for a task not registered on this root");

        let is_solo_reader = matches!(&queue[idx], Node::Reader { ids, .. } if ids.len() == 1);
        if is_solo_reader {
            queue[idx] = Node::Writer { id: task };
            return if idx == 0 { Disposition::NoConflict } else { Disposition::Conflict };
        }

        if let Node::Reader { ids, .. } = &queue[idx] {
            let (before, after): (Vec<_>, Vec<_>) = ids
                .iter()
                .copied()
                .filter(|id| *id != task)
                .partition(|id| id.raw() < task.raw());
            let mut replacement = Vec::new();
            let mut writer_index = 0;
            if !before.is_empty() {
                let lo = before.iter().map(|id| id.raw()).min().unwrap();
                let hi = before.iter().map(|id| id.raw()).max().unwrap();
                replacement.push(Node::Reader { ids: before, lo, hi });
                writer_index += 1;
            }
            replacement.push(Node::Writer { id: task });
            if !after.is_empty() {
                let lo = after.iter().map(|id| id.raw()).min().unwrap();
                let hi = after.iter().map(|id| id.raw()).max().unwrap();
                replacement.push(Node::Reader { ids: after, lo, hi });
            }
            let final_idx = idx + writer_index;
            queue.splice(idx..=idx, replacement);
            return if final_idx == 0 { Disposition::NoConflict } else { Disposition::Conflict };
        }
        unreachable!("non-reader node cannot reach this branch");
    }

    /// Removes `task` from `root`'s queue. If this empties the head
    /// node, returns the ids of the new head group - the scheduler
    /// should clear one dependence unit on each of them.
    pub fn remove_waiter(&mut self, root: MutableKey, task: ScheduleNodeId) -> Vec<ScheduleNodeId> {
        let queue = self.queue_mut(root);
        let Some(idx) = queue.iter().position(|node| node.contains(task)) else {
            return Vec::new();
        };
        let was_head = idx == 0;
        let now_empty = match &mut queue[idx] {
            Node::Writer { .. } => true,
            Node::Reader { ids, .. } => {
                ids.retain(|id| *id != task);
                ids.is_empty()
            }
        };
        if now_empty {
            queue.remove(idx);
        }
        if was_head && now_empty {
            if let Some(head) = queue.first() {
                return head.member_ids();
            }
        }
        Vec::new()
    }

    /// Merges the access queues of two ownership roots that have just
    /// been unioned into one, keyed under `dst` going forward.
    ///
    /// Implemented by flattening both queues into individual
    /// `(id, is_writer)` entries, sorting by id, and recoalescing
    /// adjacent readers - equivalent to the source's pairwise
    /// interleave-and-split walk given that each input queue is
    /// already internally ordered and coalesced, and considerably
    /// easier to verify correct.
    pub fn merge(&mut self, src: MutableKey, dst: MutableKey) {
        let src_queue = self.queues.remove(&src).unwrap_or_default();
        let dst_queue = self.queues.remove(&dst).unwrap_or_default();

        let mut entries: Vec<(u64, bool, ScheduleNodeId)> = Vec::new();
        for node in src_queue.into_iter().chain(dst_queue) {
            let is_writer = matches!(node, Node::Writer { .. });
            for id in node.member_ids() {
                entries.push((id.raw(), is_writer, id));
            }
        }
        entries.sort_by_key(|(raw, ..)| *raw);

        let mut merged: Vec<Node> = Vec::new();
        for (_, is_writer, id) in entries {
            if is_writer {
                merged.push(Node::Writer { id });
            } else {
                match merged.last_mut() {
                    Some(Node::Reader { ids, hi, .. }) => {
                        ids.push(id);
                        *hi = id.raw();
                    }
                    _ => merged.push(Node::reader(id)),
                }
            }
        }
        if !merged.is_empty() {
            self.queues.insert(dst, merged);
        }
    }

    /// True if `root` currently has no registrations.
    pub fn is_empty(&self, root: MutableKey) -> bool {
        self.queues.get(&root).map_or(true, |q| q.is_empty())
    }

    /// The id(s) currently at the head of `root`'s queue, for
    /// diagnostics and tests.
    pub fn head(&self, root: MutableKey) -> Vec<ScheduleNodeId> {
        self.queues.get(&root).and_then(|q| q.first()).map_or_else(Vec::new, |n| n.member_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::MutableHandle;

    fn id(n: u64) -> ScheduleNodeId {
        ScheduleNodeId::new_for_test(n)
    }

    fn root() -> MutableKey {
        MutableHandle::new(ScheduleNodeId::DUMMY).key()
    }

    #[test]
    fn concurrent_readers_coalesce_at_head() {
        let mut sb = Scoreboard::new();
        let root = root();
        assert_eq!(sb.add_reader(root, id(1)), Disposition::NoConflict);
        assert_eq!(sb.add_reader(root, id(2)), Disposition::NoConflict);
        assert_eq!(sb.head(root), vec![id(1), id(2)]);
    }

    #[test]
    fn writer_after_readers_waits_then_is_freed() {
        let mut sb = Scoreboard::new();
        let root = root();
        sb.add_reader(root, id(1));
        sb.add_reader(root, id(2));
        assert_eq!(sb.add_writer(root, id(3)), Disposition::Conflict);

        assert!(sb.remove_waiter(root, id(1)).is_empty());
        let woken = sb.remove_waiter(root, id(2));
        assert_eq!(woken, vec![id(3)]);
        assert_eq!(sb.head(root), vec![id(3)]);
    }

    #[test]
    fn writer_inside_reader_range_splits_the_group() {
        let mut sb = Scoreboard::new();
        let root = root();
        sb.add_reader(root, id(1));
        sb.add_reader(root, id(3));
        assert_eq!(sb.add_writer(root, id(2)), Disposition::Conflict);
        assert_eq!(sb.head(root), vec![id(1)]);

        let woken = sb.remove_waiter(root, id(1));
        assert_eq!(woken, vec![id(2)]);
    }

    #[test]
    fn change_to_writer_promotes_solo_reader_in_place() {
        let mut sb = Scoreboard::new();
        let root = root();
        sb.add_reader(root, id(1));
        assert_eq!(sb.change_to_writer(root, id(1)), Disposition::NoConflict);
        assert_eq!(sb.head(root), vec![id(1)]);
    }

    #[test]
    fn merge_interleaves_and_coalesces_by_id() {
        let mut sb = Scoreboard::new();
        let x = root();
        let y = root();
        sb.add_reader(x, id(1));
        sb.add_reader(x, id(3));
        sb.add_reader(y, id(2));
        sb.add_reader(y, id(4));
        sb.merge(x, y);
        assert_eq!(sb.head(y), vec![id(1), id(2), id(3), id(4)]);
    }
}
