//! Reference [`Mutable`](crate::mutable) collaborators.
//!
//! The content store and process wrapper are named explicitly as
//! external collaborators in section 1; `Conversation` and a plain
//! `Counter` are supplemental, grounded respectively on
//! `original_source`'s `conversation` drafts and used throughout this
//! crate's own tests as the simplest possible mutable (scenario S2
//! exercises exactly this). Each type owns a [`MutableHandle`] for its
//! ownership/scoreboard participation and its own data behind a
//! separate lock, the same split the source draws between `Mutable`'s
//! bookkeeping fields and a subclass's actual payload.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use crate::error::SchedulerError;
use crate::mutable::MutableHandle;
use crate::msgseq::ChatMessage;

/// A plain integer mutable; the simplest possible ownership
/// participant, used to exercise writer-after-readers serialization.
pub struct Counter {
    /// Ownership/scoreboard identity.
    pub handle: MutableHandle,
    value: Mutex<i64>,
}

impl Counter {
    /// Creates a counter owned by the current task, initialized to
    /// `initial`.
    pub fn new(initial: i64) -> Self {
        Counter { handle: MutableHandle::new_owned_by_current_task(), value: Mutex::new(initial) }
    }

    /// Reads the current value.
    pub fn get(&self) -> i64 {
        *self.value.lock().unwrap()
    }

    /// Adds `delta` to the value.
    pub fn add(&self, delta: i64) {
        *self.value.lock().unwrap() += delta;
    }
}

/// An append-only chat history, attachable as the `conversation`
/// argument to [`crate::graph::llm_agent`].
pub struct Conversation {
    /// Ownership/scoreboard identity.
    pub handle: MutableHandle,
    messages: Mutex<Vec<ChatMessage>>,
}

impl Conversation {
    /// Creates an empty conversation owned by the current task.
    pub fn new() -> Self {
        Conversation { handle: MutableHandle::new_owned_by_current_task(), messages: Mutex::new(Vec::new()) }
    }

    /// Appends a message.
    pub fn push(&self, message: ChatMessage) {
        self.messages.lock().unwrap().push(message);
    }

    /// Returns a snapshot of the history so far.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// A filesystem-backed content store: the "filesystem-backed content
/// store" external collaborator named in section 1.
pub struct FileStore {
    /// Ownership/scoreboard identity.
    pub handle: MutableHandle,
    root: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a content store rooted at `root`,
    /// owned by the current task.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(FileStore { handle: MutableHandle::new_owned_by_current_task(), root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Reads the bytes stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SchedulerError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `value` under `key`, replacing any existing content.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<(), SchedulerError> {
        Ok(std::fs::write(self.path_for(key), value)?)
    }

    /// The directory backing this store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A long-running child process, the "process/subprocess wrapper"
/// external collaborator named in section 1.
pub struct ProcessAgent {
    /// Ownership/scoreboard identity.
    pub handle: MutableHandle,
    child: Mutex<Child>,
}

impl ProcessAgent {
    /// Spawns `program` with `args`, owned by the current task.
    pub fn spawn(program: &str, args: &[&str]) -> Result<Self, SchedulerError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(ProcessAgent { handle: MutableHandle::new_owned_by_current_task(), child: Mutex::new(child) })
    }

    /// Blocks until the process exits, returning its status code.
    pub fn wait(&self) -> Result<i32, SchedulerError> {
        let status = self.child.lock().unwrap().wait()?;
        Ok(status.code().unwrap_or(-1))
    }

    /// Kills the process if still running.
    pub fn kill(&self) -> Result<(), SchedulerError> {
        Ok(self.child.lock().unwrap().kill()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_add_is_visible_to_subsequent_reads() {
        let counter = Counter::new(0);
        assert_eq!(counter.get(), 0);
        counter.add(1);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn file_store_round_trips_a_value() {
        let dir = std::env::temp_dir().join(format!("agentflow-filestore-test-{}", std::process::id()));
        let store = FileStore::open(&dir).unwrap();
        store.set("a", b"X").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"X".to_vec()));
        assert_eq!(store.get("missing").unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
