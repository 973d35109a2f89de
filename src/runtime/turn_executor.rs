//! Turn Executor (C11): executes one turn's parsed actions and enforces
//! the finish gate.
//!
//! A `finish` action is refused — converted back into a `Continue` turn
//! carrying an explanation — if any error occurred this turn, or if code
//! has changed during the run and the worst build-validation result over
//! those files is `Critical` (P2, P6).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::runtime::build_validation::BuildValidator;
use crate::runtime::dispatcher::{ActionDispatcher, DispatchOutcome};
use crate::runtime::parser::ParseOutcome;
use crate::runtime::validation_cache::ValidationSeverity;

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The run continues; `rendered` is the text fed back to the LLM as
    /// the next user turn.
    Continue { outcomes: Vec<DispatchOutcome>, rendered: String },
    Finished { message: String, outcomes: Vec<DispatchOutcome> },
}

pub struct TurnExecutor {
    dispatcher: Arc<ActionDispatcher>,
    build_validator: Arc<BuildValidator>,
    changed_files: Mutex<HashSet<String>>,
}

impl TurnExecutor {
    pub fn new(dispatcher: Arc<ActionDispatcher>, build_validator: Arc<BuildValidator>) -> Self {
        Self {
            dispatcher,
            build_validator,
            changed_files: Mutex::new(HashSet::new()),
        }
    }

    pub async fn execute_turn(&self, parse: &ParseOutcome) -> TurnOutcome {
        let mut rendered_sections = Vec::new();
        let mut outcomes = Vec::new();
        let mut any_error = false;
        let mut finish_outcome: Option<DispatchOutcome> = None;

        for block in &parse.blocks {
            if let Some(error) = &block.error {
                any_error = true;
                rendered_sections.push(format!(
                    "<parse_error>\n[{}] {}\n</parse_error>",
                    block.tag, error
                ));
                continue;
            }
            let Some(action) = block.action.clone() else {
                continue;
            };
            let outcome = self.dispatcher.dispatch(action).await;
            any_error |= outcome.error_occurred;
            {
                let mut changed = self.changed_files.lock().unwrap();
                changed.extend(outcome.files_changed.iter().cloned());
            }
            rendered_sections.push(outcome.envelope.clone());
            let is_finish = outcome.is_finish;
            outcomes.push(outcome.clone());
            if is_finish {
                finish_outcome = Some(outcome);
                break;
            }
        }

        if !parse.found_action_attempt {
            rendered_sections.push(
                "No action was proposed this turn. Emit an action block to make progress."
                    .to_string(),
            );
        }

        if let Some(finish) = finish_outcome {
            match self.check_finish_gate(any_error).await {
                Ok(()) => {
                    return TurnOutcome::Finished {
                        message: finish.finish_message.unwrap_or_default(),
                        outcomes,
                    }
                }
                Err(reason) => {
                    rendered_sections.push(format!(
                        "<finish_rejected>\n{}\n</finish_rejected>",
                        reason
                    ));
                }
            }
        }

        TurnOutcome::Continue {
            outcomes,
            rendered: rendered_sections.join("\n\n"),
        }
    }

    /// `Ok(())` means finish may proceed; `Err(reason)` carries the text
    /// explanation appended to the rejected-finish envelope.
    async fn check_finish_gate(&self, any_error_this_turn: bool) -> Result<(), String> {
        if any_error_this_turn {
            return Err(
                "finish refused: an error occurred this turn; resolve it before finishing"
                    .to_string(),
            );
        }
        let changed: Vec<String> = self.changed_files.lock().unwrap().iter().cloned().collect();
        if changed.is_empty() {
            return Ok(());
        }
        let report = self.build_validator.validate_files(&changed).await;
        if report.severity == ValidationSeverity::Critical {
            return Err(format!(
                "finish refused: build validation reported a critical issue: {}",
                report.message
            ));
        }
        Ok(())
    }
}
