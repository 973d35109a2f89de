//! Subagent launch and lifecycle.
//!
//! Grounded on `agent.rs`'s `Agent` (an independent LLM-driven worker with
//! its own session) combined with `orchestration.rs`'s parent/child task
//! flow: a subagent is a full turn loop of its own, scoped to one
//! [`Task`](crate::runtime::hub::Task), reporting its result back into the
//! shared [`OrchestratorHub`] when it finishes.

use std::sync::Arc;

use crate::runtime::action::ReportedContext;
use crate::runtime::dispatcher::DispatchOutcome;
use crate::runtime::executor::{LLMClient, LLMMessage, LLMRole};
use crate::runtime::hub::{OrchestratorHub, TaskStatus};
use crate::runtime::parser::ResponseParser;
use crate::runtime::turn_executor::{TurnExecutor, TurnOutcome};

/// Pulls the `(contexts, comments)` a turn's `Action::Report` carried, if
/// any. A turn can contain at most one `Report`; if several were emitted
/// the first wins.
fn find_report(outcomes: &[DispatchOutcome]) -> Option<(Vec<ReportedContext>, String)> {
    outcomes.iter().find_map(|o| o.report.clone())
}

#[derive(Debug, Clone)]
pub struct SubagentOutcome {
    pub task_id: String,
    pub succeeded: bool,
    pub final_message: String,
}

/// Drives one subagent through its own turn loop until it finishes or
/// exhausts its turn budget.
pub struct Subagent {
    task_id: String,
    llm: Arc<dyn LLMClient>,
    turn_executor: Arc<TurnExecutor>,
    parser: ResponseParser,
    hub: Arc<OrchestratorHub>,
    max_turns: usize,
}

impl Subagent {
    pub fn new(
        task_id: impl Into<String>,
        llm: Arc<dyn LLMClient>,
        turn_executor: Arc<TurnExecutor>,
        hub: Arc<OrchestratorHub>,
        max_turns: usize,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            llm,
            turn_executor,
            parser: ResponseParser::new(),
            hub,
            max_turns,
        }
    }

    pub async fn run(&self) -> SubagentOutcome {
        let Some(task) = self.hub.get_task(&self.task_id) else {
            return SubagentOutcome {
                task_id: self.task_id.clone(),
                succeeded: false,
                final_message: "task not found".to_string(),
            };
        };
        self.hub.update_task_status(&self.task_id, TaskStatus::InProgress);

        let mut messages = vec![LLMMessage::new(
            LLMRole::System,
            format!(
                "You are a {:?} subagent. Task: {}\n{}",
                task.agent_type, task.title, task.description
            ),
        )];
        let mut last_report: Option<(Vec<ReportedContext>, String)> = None;

        for turn in 0..self.max_turns {
            let reply = match self.llm.send_message(&messages).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("subagent {} LLM call failed on turn {}: {}", self.task_id, turn, e);
                    self.report_result(last_report, false);
                    return SubagentOutcome {
                        task_id: self.task_id.clone(),
                        succeeded: false,
                        final_message: format!("LLM error: {}", e),
                    };
                }
            };
            messages.push(LLMMessage::new(LLMRole::Assistant, reply.content.clone()));

            let parsed = self.parser.parse(&reply.content);
            match self.turn_executor.execute_turn(&parsed).await {
                TurnOutcome::Finished { message, outcomes } => {
                    if let Some(report) = find_report(&outcomes) {
                        last_report = Some(report);
                    }
                    self.report_result(last_report, true);
                    return SubagentOutcome {
                        task_id: self.task_id.clone(),
                        succeeded: true,
                        final_message: message,
                    };
                }
                TurnOutcome::Continue { rendered, outcomes } => {
                    if let Some(report) = find_report(&outcomes) {
                        last_report = Some(report);
                    }
                    messages.push(LLMMessage::new(LLMRole::User, rendered));
                }
            }
        }

        log::warn!("subagent {} exhausted its turn budget", self.task_id);
        self.report_result(last_report, false);
        SubagentOutcome {
            task_id: self.task_id.clone(),
            succeeded: false,
            final_message: "turn budget exhausted".to_string(),
        }
    }

    /// Calls `OrchestratorHub::process_subagent_result` once with whatever
    /// `Report` payload the run produced, or empty contexts/comments if the
    /// subagent never reported (e.g. an LLM error on the first turn).
    fn report_result(&self, report: Option<(Vec<ReportedContext>, String)>, succeeded: bool) {
        let (contexts, comments) = report.unwrap_or_default();
        self.hub
            .process_subagent_result(&self.task_id, &contexts, comments, succeeded);
    }
}
