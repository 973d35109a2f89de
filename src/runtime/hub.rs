//! Orchestrator Hub (C6, part 2): tasks, context store, sub-task graph.
//!
//! Grounded on `orchestration.rs`'s `RalphTask` id/status lifecycle,
//! generalized into a parent/child task graph with a first-write-wins
//! context store shared between the orchestrator and its subagents.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::runtime::action::{AgentType, ReportedContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

/// A subagent's terminal report against its task, recorded by
/// [`OrchestratorHub::process_subagent_result`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub context_ids_stored: Vec<String>,
    pub comments: String,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub agent_type: AgentType,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub parent_id: Option<String>,
    pub dependencies: Vec<String>,
    pub context_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// `Some` iff `status == TaskStatus::Completed`.
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub id: String,
    pub content: String,
    pub reported_by: String,
    pub task_id: Option<String>,
}

/// Zero-padded, 3-digit task id counter (`task_001`, `task_002`, ...).
fn format_task_id(n: u64) -> String {
    format!("task_{:03}", n)
}

/// Accepts both the canonical padded id and an unpadded numeric suffix
/// (`task_1` resolves the same as `task_001`) so a model that forgets the
/// padding convention still resolves correctly (P3/P4).
fn normalize_task_id(raw: &str) -> Option<String> {
    let suffix = raw.strip_prefix("task_")?;
    let n: u64 = suffix.parse().ok()?;
    Some(format_task_id(n))
}

struct Inner {
    tasks: HashMap<String, Task>,
    contexts: HashMap<String, Context>,
    next_task_id: u64,
}

/// Shared coordination state between the orchestrator and its subagents.
pub struct OrchestratorHub {
    inner: Mutex<Inner>,
}

impl Default for OrchestratorHub {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                contexts: HashMap::new(),
                next_task_id: 1,
            }),
        }
    }

    pub fn create_task(
        &self,
        agent_type: AgentType,
        title: impl Into<String>,
        description: impl Into<String>,
        context_refs: Vec<String>,
    ) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = format_task_id(inner.next_task_id);
        inner.next_task_id += 1;
        inner.tasks.insert(
            id.clone(),
            Task {
                id: id.clone(),
                agent_type,
                title: title.into(),
                description: description.into(),
                status: TaskStatus::Created,
                parent_id: None,
                dependencies: Vec::new(),
                context_refs,
                created_at: Utc::now(),
                completed_at: None,
                result: None,
            },
        );
        id
    }

    /// Creates a sub-task under `parent_id`, depending on `dependencies`
    /// (other task ids, by convention siblings created earlier in the same
    /// decomposition). Missing dependency ids are accepted as-is; they
    /// simply never resolve to `completed`, so the child never becomes
    /// ready rather than erroring at creation time.
    pub fn decompose_task(
        &self,
        parent_id: &str,
        agent_type: AgentType,
        title: impl Into<String>,
        description: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Option<String> {
        let parent_id = self.resolve_id(parent_id)?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.tasks.contains_key(&parent_id) {
            return None;
        }
        let id = format_task_id(inner.next_task_id);
        inner.next_task_id += 1;
        inner.tasks.insert(
            id.clone(),
            Task {
                id: id.clone(),
                agent_type,
                title: title.into(),
                description: description.into(),
                status: TaskStatus::Created,
                parent_id: Some(parent_id),
                dependencies,
                context_refs: Vec::new(),
                created_at: Utc::now(),
                completed_at: None,
                result: None,
            },
        );
        Some(id)
    }

    /// Sub-tasks of `parent_id` that are still `Created` and whose every
    /// dependency has resolved to `Completed`.
    pub fn get_ready_sub_tasks(&self, parent_id: &str) -> Vec<Task> {
        let Some(parent_id) = self.resolve_id(parent_id) else {
            return Vec::new();
        };
        let inner = self.inner.lock().unwrap();
        inner
            .tasks
            .values()
            .filter(|t| {
                t.parent_id.as_deref() == Some(parent_id.as_str())
                    && t.status == TaskStatus::Created
                    && t.dependencies.iter().all(|dep| {
                        inner
                            .tasks
                            .get(dep)
                            .map(|d| d.status == TaskStatus::Completed)
                            .unwrap_or(false)
                    })
            })
            .cloned()
            .collect()
    }

    pub fn update_task_status(&self, task_id: &str, status: TaskStatus) -> bool {
        let Some(task_id) = self.resolve_id(task_id) else {
            return false;
        };
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get_mut(&task_id) else {
            return false;
        };
        task.status = status;
        task.completed_at = if status == TaskStatus::Completed {
            Some(Utc::now())
        } else {
            None
        };
        let parent_id = task.parent_id.clone();
        if let Some(parent_id) = parent_id {
            self.maybe_complete_parent(&mut inner, &parent_id);
        }
        true
    }

    /// A parent whose children have all resolved to a terminal status and
    /// none failed is auto-completed (auto-completion propagation).
    fn maybe_complete_parent(&self, inner: &mut Inner, parent_id: &str) {
        let children: Vec<&Task> = inner
            .tasks
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .collect();
        if children.is_empty() {
            return;
        }
        let all_completed = children.iter().all(|c| c.status == TaskStatus::Completed);
        let any_failed = children.iter().any(|c| c.status == TaskStatus::Failed);
        if any_failed {
            if let Some(parent) = inner.tasks.get_mut(parent_id) {
                if parent.status != TaskStatus::Completed {
                    parent.status = TaskStatus::Failed;
                    parent.completed_at = None;
                }
            }
        } else if all_completed {
            if let Some(parent) = inner.tasks.get_mut(parent_id) {
                parent.status = TaskStatus::Completed;
                parent.completed_at = Some(Utc::now());
            }
        }
    }

    /// Records a subagent's terminal result against its task: context
    /// entries are stored task-scoped (first-write-wins, per
    /// [`Self::add_context`]), comments are attached to the task's
    /// [`TaskResult`], and the task's status is flipped to `Completed` or
    /// `Failed`.
    pub fn process_subagent_result(
        &self,
        task_id: &str,
        contexts: &[ReportedContext],
        comments: impl Into<String>,
        succeeded: bool,
    ) -> bool {
        let Some(resolved) = self.resolve_id(task_id) else {
            return false;
        };
        let context_ids_stored: Vec<String> = contexts
            .iter()
            .filter(|ctx| {
                self.add_context(
                    ctx.id.clone(),
                    ctx.content.clone(),
                    "subagent",
                    Some(resolved.clone()),
                )
            })
            .map(|ctx| ctx.id.clone())
            .collect();

        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(task) = inner.tasks.get_mut(&resolved) {
                task.result = Some(TaskResult {
                    task_id: resolved.clone(),
                    context_ids_stored,
                    comments: comments.into(),
                });
            }
        }

        self.update_task_status(
            &resolved,
            if succeeded {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            },
        )
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        let task_id = self.resolve_id(task_id)?;
        self.inner.lock().unwrap().tasks.get(&task_id).cloned()
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.inner.lock().unwrap().tasks.values().cloned().collect()
    }

    /// First-write-wins: a context id that already exists is left
    /// untouched and the call is a no-op.
    pub fn add_context(
        &self,
        id: impl Into<String>,
        content: impl Into<String>,
        reported_by: impl Into<String>,
        task_id: Option<String>,
    ) -> bool {
        let id = id.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.contexts.contains_key(&id) {
            return false;
        }
        inner.contexts.insert(
            id.clone(),
            Context {
                id,
                content: content.into(),
                reported_by: reported_by.into(),
                task_id,
            },
        );
        true
    }

    /// Resolves `refs` against the context store; ids that don't resolve
    /// are logged and omitted rather than treated as an error (§4.4).
    pub fn get_contexts_for_refs(&self, refs: &[String]) -> Vec<Context> {
        let inner = self.inner.lock().unwrap();
        refs.iter()
            .filter_map(|r| match inner.contexts.get(r) {
                Some(ctx) => Some(ctx.clone()),
                None => {
                    log::warn!("context ref '{}' not found, omitting", r);
                    None
                }
            })
            .collect()
    }

    pub fn get_contexts_for_task(&self, task_id: &str) -> Vec<Context> {
        let Some(task_id) = self.resolve_id(task_id) else {
            return Vec::new();
        };
        let inner = self.inner.lock().unwrap();
        inner
            .contexts
            .values()
            .filter(|c| c.task_id.as_deref() == Some(task_id.as_str()))
            .cloned()
            .collect()
    }

    fn resolve_id(&self, raw: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        if inner.tasks.contains_key(raw) {
            return Some(raw.to_string());
        }
        normalize_task_id(raw).filter(|id| inner.tasks.contains_key(id))
    }
}
