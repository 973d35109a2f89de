//! Action Dispatcher (C10): routes validated actions to typed handlers.
//!
//! Grounded on `tool_protocol.rs`'s `ToolRegistry::execute_tool` routing
//! idiom — dispatch-by-name into a handler, with results logged and metered
//! uniformly regardless of which handler ran.

use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use crate::runtime::action::{Action, ReportedContext, TodoOperationKind};
use crate::runtime::error_classifier::{classify, with_retry};
use crate::runtime::executor::{CommandExecutor, LLMClient};
use crate::runtime::file_manager::FileManager;
use crate::runtime::hub::OrchestratorHub;
use crate::runtime::metrics::{ErrorDetail, MetricsCollector};
use crate::runtime::search_manager::SearchManager;
use crate::runtime::state::{ScratchpadManager, TodoManager};
use crate::runtime::subagent::Subagent;
use crate::runtime::turn_executor::TurnExecutor;

/// Outcome of dispatching a single [`Action`].
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub tag: String,
    /// The envelope-wrapped text handed back to the LLM.
    pub envelope: String,
    pub error_occurred: bool,
    /// Paths touched by a Write/Edit/MultiEdit, surfaced so the Turn
    /// Executor knows to run build validation before allowing `finish`.
    /// Only populated for a curated set of code/build file names and
    /// extensions (§4.8/P5) — touching e.g. a `.md` scratch file doesn't
    /// trigger a build-validation gate.
    pub files_changed: Vec<String>,
    pub is_finish: bool,
    pub finish_message: Option<String>,
    /// Set by `Action::Report`: the contexts and comments it carried,
    /// threaded up to [`crate::runtime::subagent::Subagent::run`] so it can
    /// call `OrchestratorHub::process_subagent_result` with the real
    /// payload instead of a bare success bool.
    pub report: Option<(Vec<ReportedContext>, String)>,
}

fn envelope(kind: &str, body: impl AsRef<str>) -> String {
    format!("<{kind}_output>\n{}\n</{kind}_output>", body.as_ref())
}

/// Strips the `<kind_output>`/`</kind_output>` wrapper back off, for
/// feeding a failed action's body into [`classify`]/the metrics record
/// without the envelope tags polluting the pattern match.
fn strip_envelope(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|l| !(l.starts_with("<") && l.ends_with("_output>")))
        .collect::<Vec<_>>()
        .join("\n")
}

struct BashOpError {
    message: String,
    exit_code: Option<i32>,
}

/// Manifest file names treated as "code" regardless of extension.
const BUILD_FILENAMES: &[&str] = &[
    "Makefile",
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "tsconfig.json",
];

/// Extensions whose edits are worth gating a build-validation pass on.
const CODE_EXTENSIONS: &[&str] = &[
    "js", "ts", "tsx", "jsx", "py", "java", "cpp", "cc", "cxx", "c", "h", "hpp", "cs", "php",
    "rb", "go", "rs", "swift", "kt",
];

/// Whether a write/edit to `path` should be surfaced as a changed file for
/// build validation to act on (§4.8/P5). Scratch notes, docs, and other
/// non-code writes don't gate `finish` on a build probe.
fn is_code_file(path: &str) -> bool {
    let file_name = Path::new(path).file_name().and_then(|f| f.to_str()).unwrap_or(path);
    if BUILD_FILENAMES.contains(&file_name) {
        return true;
    }
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext))
}

pub struct ActionDispatcher {
    executor: Arc<dyn CommandExecutor>,
    file_manager: Arc<FileManager>,
    search_manager: Arc<SearchManager>,
    todos: Arc<TodoManager>,
    scratchpad: Arc<ScratchpadManager>,
    hub: Arc<OrchestratorHub>,
    metrics: Arc<MetricsCollector>,
    max_retry_attempts: u32,
    llm: Arc<dyn LLMClient>,
    max_subagent_turns: usize,
    /// Bound post-construction via [`Self::bind_turn_executor`] to avoid an
    /// `Arc` reference cycle: the `TurnExecutor` owns an `Arc<ActionDispatcher>`,
    /// so this side can only hold a `Weak` back-reference.
    turn_executor: Mutex<Option<Weak<TurnExecutor>>>,
}

impl ActionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        file_manager: Arc<FileManager>,
        search_manager: Arc<SearchManager>,
        todos: Arc<TodoManager>,
        scratchpad: Arc<ScratchpadManager>,
        hub: Arc<OrchestratorHub>,
        metrics: Arc<MetricsCollector>,
        max_retry_attempts: u32,
        llm: Arc<dyn LLMClient>,
        max_subagent_turns: usize,
    ) -> Self {
        Self {
            executor,
            file_manager,
            search_manager,
            todos,
            scratchpad,
            hub,
            metrics,
            max_retry_attempts,
            llm,
            max_subagent_turns,
            turn_executor: Mutex::new(None),
        }
    }

    /// Wires the `TurnExecutor` a launched subagent should run its turns
    /// through. Call once, right after constructing the real `TurnExecutor`
    /// that wraps this dispatcher.
    pub fn bind_turn_executor(&self, turn_executor: &Arc<TurnExecutor>) {
        *self.turn_executor.lock().unwrap() = Some(Arc::downgrade(turn_executor));
    }

    pub async fn dispatch(&self, action: Action) -> DispatchOutcome {
        let started = Instant::now();
        let tag = action.tag().to_string();
        let outcome = self.dispatch_inner(action).await;
        let error_detail = outcome.error_occurred.then(|| {
            let body = strip_envelope(&outcome.envelope);
            ErrorDetail {
                error_type: classify(&body, None).to_string(),
                error_message: body,
                context: Some(tag.clone()),
            }
        });
        self.metrics.record(
            &tag,
            !outcome.error_occurred,
            started.elapsed().as_millis() as u64,
            error_detail,
        );
        if outcome.error_occurred {
            log::warn!("[{}] action failed", tag);
        }
        outcome
    }

    async fn dispatch_inner(&self, action: Action) -> DispatchOutcome {
        match action {
            Action::Bash { cmd, timeout_secs, .. } => {
                self.run_bash("bash", &cmd, timeout_secs).await
            }
            Action::BatchBash {
                commands,
                continue_on_error,
                ..
            } => {
                let mut sections = Vec::with_capacity(commands.len());
                let mut any_error = false;
                for batch_cmd in commands {
                    let label = batch_cmd.label.clone().unwrap_or_else(|| batch_cmd.cmd.clone());
                    let timeout = batch_cmd.timeout.unwrap_or(60);
                    let result = self.run_bash("bash", &batch_cmd.cmd, timeout).await;
                    let failed = result.error_occurred;
                    sections.push(format!("=== {} ===\n{}", label, result.envelope));
                    any_error |= failed;
                    if failed && !continue_on_error {
                        break;
                    }
                }
                DispatchOutcome {
                    tag: "batch_bash".to_string(),
                    envelope: envelope("batch_bash", sections.join("\n\n")),
                    error_occurred: any_error,
                    files_changed: vec![],
                    is_finish: false,
                    finish_message: None,
                    report: None,
                }
            }
            Action::Finish { message } => DispatchOutcome {
                tag: "finish".to_string(),
                envelope: envelope("finish", &message),
                error_occurred: false,
                files_changed: vec![],
                is_finish: true,
                finish_message: Some(message),
                report: None,
            },
            Action::BatchTodo { operations, view_all } => {
                let mut lines = Vec::new();
                for op in operations {
                    match op.action {
                        TodoOperationKind::Add => {
                            let id = self.todos.add(op.content.unwrap_or_default());
                            lines.push(format!("added todo #{}", id));
                        }
                        TodoOperationKind::Complete => {
                            let id = op.task_id.unwrap_or_default();
                            let ok = self.todos.complete(id);
                            lines.push(format!("completed todo #{}: {}", id, ok));
                        }
                        TodoOperationKind::Delete => {
                            let id = op.task_id.unwrap_or_default();
                            let ok = self.todos.delete(id);
                            lines.push(format!("deleted todo #{}: {}", id, ok));
                        }
                    }
                }
                if view_all {
                    for todo in self.todos.list() {
                        lines.push(format!("[{:?}] #{} {}", todo.status, todo.id, todo.content));
                    }
                }
                plain_outcome("todo", lines.join("\n"), false)
            }
            Action::Read {
                file_path,
                offset,
                limit,
            } => match self.file_manager.read_file(&file_path, offset, limit).await {
                Ok(content) => plain_outcome("read", content, false),
                Err(e) => plain_outcome("read", e.to_string(), true),
            },
            Action::Write { file_path, content } => {
                match self.file_manager.write_file(&file_path, &content).await {
                    Ok(strategy) => {
                        let mut out = plain_outcome(
                            "write",
                            format!("wrote {} via {:?}", file_path, strategy),
                            false,
                        );
                        if is_code_file(&file_path) {
                            out.files_changed = vec![file_path];
                        }
                        out
                    }
                    Err(e) => plain_outcome("write", e.to_string(), true),
                }
            }
            Action::Edit {
                file_path,
                old_string,
                new_string,
                replace_all,
            } => {
                match self
                    .file_manager
                    .edit_file(&file_path, &old_string, &new_string, replace_all)
                    .await
                {
                    Ok(strategy) => {
                        let mut out = plain_outcome(
                            "edit",
                            format!("edited {} via {:?}", file_path, strategy),
                            false,
                        );
                        if is_code_file(&file_path) {
                            out.files_changed = vec![file_path];
                        }
                        out
                    }
                    Err(e) => plain_outcome("edit", e.to_string(), true),
                }
            }
            Action::MultiEdit { file_path, edits } => {
                let specs: Vec<(String, String, bool)> = edits
                    .into_iter()
                    .map(|e| (e.old_string, e.new_string, e.replace_all))
                    .collect();
                match self.file_manager.multi_edit_file(&file_path, &specs).await {
                    Ok(strategies) => {
                        let mut out = plain_outcome(
                            "multi_edit",
                            format!("applied {} edits to {}", strategies.len(), file_path),
                            false,
                        );
                        if is_code_file(&file_path) {
                            out.files_changed = vec![file_path];
                        }
                        out
                    }
                    Err(e) => plain_outcome("multi_edit", e.to_string(), true),
                }
            }
            Action::FileMetadata { file_paths } => {
                match self.file_manager.get_metadata(&file_paths).await {
                    Ok(entries) => {
                        let rendered = entries
                            .iter()
                            .map(|e| {
                                format!(
                                    "{}: exists={} size={} dir={}",
                                    e.path, e.exists, e.size, e.is_directory
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        plain_outcome("file_metadata", rendered, false)
                    }
                    Err(e) => plain_outcome("file_metadata", e.to_string(), true),
                }
            }
            Action::Grep { pattern, path, include } => {
                match self
                    .search_manager
                    .grep(&pattern, path.as_deref(), include.as_deref())
                    .await
                {
                    Ok(result) => plain_outcome("grep", render_search(&result), false),
                    Err(e) => plain_outcome("grep", e.to_string(), true),
                }
            }
            Action::Glob { pattern, path } => {
                match self.search_manager.glob(&pattern, path.as_deref()).await {
                    Ok(result) => plain_outcome("glob", render_search(&result), false),
                    Err(e) => plain_outcome("glob", e.to_string(), true),
                }
            }
            Action::Ls { path, ignore } => match self.search_manager.ls(&path, &ignore).await {
                Ok(result) => plain_outcome("ls", render_search(&result), false),
                Err(e) => plain_outcome("ls", e.to_string(), true),
            },
            Action::AddNote { content } => {
                let n = self.scratchpad.add(content);
                plain_outcome("scratchpad", format!("note {} added", n), false)
            }
            Action::ViewAllNotes => {
                plain_outcome("scratchpad", self.scratchpad.view_all().join("\n"), false)
            }
            Action::TaskCreate {
                agent_type,
                title,
                description,
                context_refs,
                auto_launch,
                ..
            } => {
                let id = self.hub.create_task(agent_type, title, description, context_refs);
                if auto_launch {
                    log::info!("auto-launching subagent for {}", id);
                    let launch = self.launch_subagent(&id).await;
                    return DispatchOutcome {
                        tag: "task_create".to_string(),
                        envelope: format!("{}\n{}", envelope("task_create", &id), launch.envelope),
                        error_occurred: launch.error_occurred,
                        files_changed: vec![],
                        is_finish: false,
                        finish_message: None,
                        report: None,
                    };
                }
                plain_outcome("task_create", id, false)
            }
            Action::AddContext {
                id,
                content,
                reported_by,
                task_id,
            } => {
                let inserted = self.hub.add_context(&id, content, reported_by, task_id);
                plain_outcome(
                    "add_context",
                    if inserted {
                        format!("context {} recorded", id)
                    } else {
                        format!("context {} already existed, ignored", id)
                    },
                    false,
                )
            }
            Action::LaunchSubagent { task_id } => self.launch_subagent(&task_id).await,
            Action::Report { contexts, comments } => DispatchOutcome {
                tag: "report".to_string(),
                envelope: envelope("report", &comments),
                error_occurred: false,
                files_changed: vec![],
                is_finish: false,
                finish_message: None,
                report: Some((contexts, comments)),
            },
        }
    }

    /// Shared by `Action::LaunchSubagent` and `TaskCreate.auto_launch`:
    /// upgrades the bound `Weak<TurnExecutor>` and drives one subagent's
    /// turn loop to completion.
    async fn launch_subagent(&self, task_id: &str) -> DispatchOutcome {
        if self.hub.get_task(task_id).is_none() {
            return plain_outcome("launch_subagent", format!("task {} not found", task_id), true);
        }
        let turn_executor = self.turn_executor.lock().unwrap().as_ref().and_then(Weak::upgrade);
        let Some(turn_executor) = turn_executor else {
            return plain_outcome(
                "launch_subagent",
                format!(
                    "task {} found but no turn executor bound; call bind_turn_executor first",
                    task_id
                ),
                true,
            );
        };
        let subagent = Subagent::new(
            task_id.to_string(),
            Arc::clone(&self.llm),
            turn_executor,
            Arc::clone(&self.hub),
            self.max_subagent_turns,
        );
        let outcome = subagent.run().await;
        plain_outcome(
            "launch_subagent",
            format!(
                "task {} finished: succeeded={} {}",
                task_id, outcome.succeeded, outcome.final_message
            ),
            !outcome.succeeded,
        )
    }

    async fn run_bash(&self, kind: &str, cmd: &str, timeout_secs: u64) -> DispatchOutcome {
        let executor = Arc::clone(&self.executor);
        let result = with_retry(
            self.max_retry_attempts,
            || {
                let executor = Arc::clone(&executor);
                let cmd = cmd.to_string();
                async move {
                    match executor.execute(&cmd, timeout_secs).await {
                        Ok(output) if output.success() => Ok(output),
                        Ok(output) => Err(BashOpError {
                            message: output.stderr.clone(),
                            exit_code: Some(output.exit_code),
                        }),
                        Err(e) => Err(BashOpError {
                            message: e.to_string(),
                            exit_code: None,
                        }),
                    }
                }
            },
            |e| (e.message.clone(), e.exit_code),
        )
        .await;

        match result {
            Ok(output) => plain_outcome(kind, output.stdout, false),
            Err(e) => {
                let kind_marker = classify(&e.message, e.exit_code);
                plain_outcome(kind, format!("[{}] {}", kind_marker, e.message), true)
            }
        }
    }
}

fn plain_outcome(kind: &str, body: impl AsRef<str>, error_occurred: bool) -> DispatchOutcome {
    DispatchOutcome {
        tag: kind.to_string(),
        envelope: envelope(kind, body),
        error_occurred,
        files_changed: vec![],
        is_finish: false,
        finish_message: None,
        report: None,
    }
}

fn render_search(result: &crate::runtime::search_manager::SearchResult) -> String {
    let mut rendered = result.lines.join("\n");
    if result.truncated {
        rendered.push_str("\n... [results truncated]");
    }
    rendered
}
