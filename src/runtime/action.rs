//! Action Schema Registry
//!
//! Declares every action variant the runtime can dispatch and the field
//! constraints the [`parser`](crate::runtime::parser) relies on to reject
//! malformed LLM output before it ever reaches the [`dispatcher`](crate::runtime::dispatcher).
//!
//! # Architecture
//!
//! Every action the LLM can request is a variant of [`Action`], a plain sum
//! type discriminated by the XML tag name it was parsed from. The
//! [`parser`](crate::runtime::parser) builds a value for each recognized tag
//! body and immediately runs it through [`Action::validate`]; anything that
//! fails becomes a rendered validation error rather than reaching the
//! dispatcher.
//!
//! # Example
//!
//! ```rust
//! use loopsmith::Action;
//!
//! let action = Action::Bash {
//!     cmd: "echo hi".to_string(),
//!     block: true,
//!     timeout_secs: 60,
//! };
//! assert!(action.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// An explorer-style subagent reads and reports; a coder-style subagent also edits files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Explorer,
    Coder,
}

/// A single command within a [`Action::BatchBash`] request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCommand {
    pub cmd: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// One mutation within a [`Action::BatchTodo`] request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoOperation {
    pub action: TodoOperationKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub task_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoOperationKind {
    Add,
    Complete,
    Delete,
}

/// One edit within a [`Action::MultiEdit`] request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSpec {
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

/// A file or directory the orchestrator pre-reads for a subagent before launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBootstrap {
    pub path: String,
    pub reason: String,
}

/// One context entry carried in a [`Action::Report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedContext {
    pub id: String,
    pub content: String,
}

/// The full set of structured instructions an LLM turn can emit.
///
/// Discriminant = action kind (the XML tag name the parser extracted this
/// from); each variant carries only already-validated fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Action {
    Bash {
        cmd: String,
        #[serde(default = "default_true")]
        block: bool,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
    BatchBash {
        commands: Vec<BatchCommand>,
        #[serde(default = "default_true")]
        parallel: bool,
        #[serde(default)]
        continue_on_error: bool,
    },
    Finish {
        #[serde(default = "default_finish_message")]
        message: String,
    },
    BatchTodo {
        operations: Vec<TodoOperation>,
        #[serde(default)]
        view_all: bool,
    },
    Read {
        file_path: String,
        #[serde(default)]
        offset: Option<u64>,
        #[serde(default)]
        limit: Option<u64>,
    },
    Write {
        file_path: String,
        content: String,
    },
    Edit {
        file_path: String,
        old_string: String,
        new_string: String,
        #[serde(default)]
        replace_all: bool,
    },
    MultiEdit {
        file_path: String,
        edits: Vec<EditSpec>,
    },
    FileMetadata {
        #[serde(alias = "filePaths")]
        file_paths: Vec<String>,
    },
    Grep {
        pattern: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        include: Option<String>,
    },
    Glob {
        pattern: String,
        #[serde(default)]
        path: Option<String>,
    },
    Ls {
        path: String,
        #[serde(default)]
        ignore: Vec<String>,
    },
    AddNote {
        content: String,
    },
    ViewAllNotes,
    TaskCreate {
        agent_type: AgentType,
        title: String,
        description: String,
        #[serde(default)]
        context_refs: Vec<String>,
        #[serde(default)]
        context_bootstrap: Vec<ContextBootstrap>,
        #[serde(default)]
        auto_launch: bool,
    },
    AddContext {
        id: String,
        content: String,
        #[serde(default = "default_reporter")]
        reported_by: String,
        #[serde(default)]
        task_id: Option<String>,
    },
    LaunchSubagent {
        task_id: String,
    },
    Report {
        #[serde(default)]
        contexts: Vec<ReportedContext>,
        #[serde(default)]
        comments: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    60
}

fn default_finish_message() -> String {
    "Task completed".to_string()
}

fn default_reporter() -> String {
    "?".to_string()
}

/// A constraint violation found while validating a parsed [`Action`].
///
/// Rendered by the parser as `"[<tag>] Validation error: <path>: <msg>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionValidationError {
    pub path: String,
    pub message: String,
}

impl ActionValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ActionValidationError {}

impl Action {
    /// The tag name this action would have been parsed from (used in
    /// envelopes and error messages).
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Bash { .. } => "bash",
            Action::BatchBash { .. } => "batch_bash",
            Action::Finish { .. } => "finish",
            Action::BatchTodo { .. } => "todo",
            Action::Read { .. } => "file",
            Action::Write { .. } => "file",
            Action::Edit { .. } => "file",
            Action::MultiEdit { .. } => "file",
            Action::FileMetadata { .. } => "file",
            Action::Grep { .. } => "search",
            Action::Glob { .. } => "search",
            Action::Ls { .. } => "search",
            Action::AddNote { .. } => "scratchpad",
            Action::ViewAllNotes => "scratchpad",
            Action::TaskCreate { .. } => "task_create",
            Action::AddContext { .. } => "add_context",
            Action::LaunchSubagent { .. } => "launch_subagent",
            Action::Report { .. } => "report",
        }
    }

    /// Runtime validation of field constraints (§3). Invoked immediately
    /// after parsing; a parsed action is never handed to the dispatcher
    /// without passing this check (P1).
    pub fn validate(&self) -> Result<(), ActionValidationError> {
        match self {
            Action::Bash {
                cmd, timeout_secs, ..
            } => {
                if cmd.trim().is_empty() {
                    return Err(ActionValidationError::new("cmd", "must not be empty"));
                }
                if !(1..=300).contains(timeout_secs) {
                    return Err(ActionValidationError::new(
                        "timeoutSecs",
                        "must be between 1 and 300",
                    ));
                }
                Ok(())
            }
            Action::BatchBash { commands, .. } => {
                if commands.is_empty() {
                    return Err(ActionValidationError::new(
                        "commands",
                        "must contain at least one command",
                    ));
                }
                for (i, c) in commands.iter().enumerate() {
                    if c.cmd.trim().is_empty() {
                        return Err(ActionValidationError::new(
                            format!("commands[{}].cmd", i),
                            "must not be empty",
                        ));
                    }
                }
                Ok(())
            }
            Action::Finish { .. } => Ok(()),
            Action::BatchTodo { operations, .. } => {
                for (i, op) in operations.iter().enumerate() {
                    match op.action {
                        TodoOperationKind::Add => {
                            if op.content.as_deref().unwrap_or("").trim().is_empty() {
                                return Err(ActionValidationError::new(
                                    format!("operations[{}].content", i),
                                    "required for add",
                                ));
                            }
                        }
                        TodoOperationKind::Complete | TodoOperationKind::Delete => {
                            if op.task_id.is_none() {
                                return Err(ActionValidationError::new(
                                    format!("operations[{}].taskId", i),
                                    "required for complete/delete",
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
            Action::Read { file_path, limit, .. } => {
                if file_path.trim().is_empty() {
                    return Err(ActionValidationError::new("filePath", "must not be empty"));
                }
                if let Some(0) = limit {
                    return Err(ActionValidationError::new("limit", "must be >= 1"));
                }
                Ok(())
            }
            Action::Write { file_path, .. } | Action::Edit { file_path, .. } => {
                if file_path.trim().is_empty() {
                    return Err(ActionValidationError::new("filePath", "must not be empty"));
                }
                Ok(())
            }
            Action::MultiEdit { file_path, edits } => {
                if file_path.trim().is_empty() {
                    return Err(ActionValidationError::new("filePath", "must not be empty"));
                }
                if edits.is_empty() {
                    return Err(ActionValidationError::new(
                        "edits",
                        "must contain at least one edit",
                    ));
                }
                Ok(())
            }
            Action::FileMetadata { file_paths } => {
                if file_paths.is_empty() || file_paths.len() > 10 {
                    return Err(ActionValidationError::new(
                        "filePaths",
                        "must contain between 1 and 10 paths",
                    ));
                }
                Ok(())
            }
            Action::Grep { pattern, .. } => {
                if pattern.trim().is_empty() {
                    return Err(ActionValidationError::new("pattern", "must not be empty"));
                }
                Ok(())
            }
            Action::Glob { .. } | Action::Ls { .. } => Ok(()),
            Action::AddNote { content } => {
                if content.trim().is_empty() {
                    return Err(ActionValidationError::new("content", "must not be empty"));
                }
                Ok(())
            }
            Action::ViewAllNotes => Ok(()),
            Action::TaskCreate { title, description, .. } => {
                if title.trim().is_empty() {
                    return Err(ActionValidationError::new("title", "must not be empty"));
                }
                if description.trim().is_empty() {
                    return Err(ActionValidationError::new(
                        "description",
                        "must not be empty",
                    ));
                }
                Ok(())
            }
            Action::AddContext { id, .. } => {
                if id.trim().is_empty() {
                    return Err(ActionValidationError::new("id", "must not be empty"));
                }
                Ok(())
            }
            Action::LaunchSubagent { task_id } => {
                if task_id.trim().is_empty() {
                    return Err(ActionValidationError::new("taskId", "must not be empty"));
                }
                Ok(())
            }
            Action::Report { .. } => Ok(()),
        }
    }
}
