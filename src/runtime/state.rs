//! In-memory task/scratchpad state managers (C6, part 1).
//!
//! Grounded on `tools/memory.rs`'s `Arc<Mutex<HashMap>>` state pattern,
//! simplified since neither store needs TTL expiry.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone)]
pub struct Todo {
    pub id: u64,
    pub content: String,
    pub status: TodoStatus,
}

struct TodoInner {
    items: BTreeMap<u64, Todo>,
    next_id: u64,
}

/// Flat todo list with monotonically increasing integer ids (ids are never
/// reused, even after a delete).
pub struct TodoManager {
    inner: Mutex<TodoInner>,
}

impl Default for TodoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TodoInner {
                items: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub fn add(&self, content: impl Into<String>) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.items.insert(
            id,
            Todo {
                id,
                content: content.into(),
                status: TodoStatus::Pending,
            },
        );
        id
    }

    /// Returns `false` if `id` is not a known todo (caller surfaces that as
    /// a dispatch-time error rather than panicking).
    pub fn complete(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.items.get_mut(&id) {
            Some(todo) => {
                todo.status = TodoStatus::Completed;
                true
            }
            None => false,
        }
    }

    pub fn delete(&self, id: u64) -> bool {
        self.inner.lock().unwrap().items.remove(&id).is_some()
    }

    pub fn list(&self) -> Vec<Todo> {
        self.inner.lock().unwrap().items.values().cloned().collect()
    }
}

/// Append-only scratchpad of free-form notes, presented to the LLM as a
/// 1-based numbered list.
pub struct ScratchpadManager {
    notes: Mutex<Vec<String>>,
}

impl Default for ScratchpadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchpadManager {
    pub fn new() -> Self {
        Self {
            notes: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, content: impl Into<String>) -> usize {
        let mut notes = self.notes.lock().unwrap();
        notes.push(content.into());
        notes.len()
    }

    /// Renders every note as `"{1-based index}. {content}"`.
    pub fn view_all(&self) -> Vec<String> {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, note)| format!("{}. {}", i + 1, note))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
