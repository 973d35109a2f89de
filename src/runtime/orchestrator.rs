//! Orchestrator (C12): the main turn loop.
//!
//! Grounded on `orchestration.rs`'s `Orchestration::run` per-round loop:
//! compose the next prompt, call the LLM, feed the reply through the Turn
//! Executor, accumulate history, and stop at `finish` or the turn budget.

use std::sync::Arc;

use crate::runtime::config::RuntimeConfig;
use crate::runtime::executor::{LLMClient, LLMMessage, LLMRole};
use crate::runtime::history::{render_turn_summary, ConversationHistory};
use crate::runtime::parser::ResponseParser;
use crate::runtime::turn_executor::{TurnExecutor, TurnOutcome};

/// Why the orchestrator stopped.
#[derive(Debug, Clone)]
pub enum OrchestratorOutcome {
    Finished { message: String, turns_used: usize },
    MaxTurnsReached { turns_used: usize },
    LLMError { message: String, turns_used: usize },
}

pub struct Orchestrator {
    llm: Arc<dyn LLMClient>,
    turn_executor: Arc<TurnExecutor>,
    parser: ResponseParser,
    history: ConversationHistory,
    max_turns: usize,
    system_prompt: String,
    instruction: String,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        turn_executor: Arc<TurnExecutor>,
        config: &RuntimeConfig,
        system_prompt: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        // A rough token budget per turn of conversation, same approximation
        // `llm_session.rs` uses: bound primarily by turn count, tokens as a
        // secondary safety valve.
        let max_tokens = config.max_history_turns.saturating_mul(500).max(2_000);
        Self {
            llm,
            turn_executor,
            parser: ResponseParser::new(),
            history: ConversationHistory::new(max_tokens, config.max_history_turns),
            max_turns: config.max_turns,
            system_prompt: system_prompt.into(),
            instruction: instruction.into(),
        }
    }

    pub async fn run(&mut self) -> OrchestratorOutcome {
        self.history.push(LLMMessage::new(LLMRole::System, self.system_prompt.clone()));
        self.history.push(LLMMessage::new(
            LLMRole::User,
            format!("## Current Task\n{}\n\nNo turns executed yet.", self.instruction),
        ));

        for turn in 1..=self.max_turns {
            let reply = match self.llm.send_message(self.history.messages()).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("orchestrator LLM call failed on turn {}: {}", turn, e);
                    return OrchestratorOutcome::LLMError {
                        message: e.to_string(),
                        turns_used: turn,
                    };
                }
            };
            self.history
                .push(LLMMessage::new(LLMRole::Assistant, reply.content.clone()));

            let parsed = self.parser.parse(&reply.content);
            match self.turn_executor.execute_turn(&parsed).await {
                TurnOutcome::Finished { message, .. } => {
                    log::info!("orchestrator finished after {} turns", turn);
                    return OrchestratorOutcome::Finished {
                        message,
                        turns_used: turn,
                    };
                }
                TurnOutcome::Continue { rendered, .. } => {
                    let state_summary = render_turn_summary(&reply.content, &rendered);
                    self.history.push(LLMMessage::new(
                        LLMRole::User,
                        format!("## Current Task\n{}\n\n{}", self.instruction, state_summary),
                    ));
                }
            }
        }

        log::warn!("orchestrator reached its {}-turn budget without finishing", self.max_turns);
        OrchestratorOutcome::MaxTurnsReached {
            turns_used: self.max_turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::build_validation::BuildValidator;
    use crate::runtime::dispatcher::ActionDispatcher;
    use crate::runtime::executor::{CommandExecutor, CommandExecutorError, CommandOutput, LLMReply};
    use crate::runtime::file_manager::FileManager;
    use crate::runtime::hub::OrchestratorHub;
    use crate::runtime::metrics::MetricsCollector;
    use crate::runtime::search_manager::SearchManager;
    use crate::runtime::state::{ScratchpadManager, TodoManager};
    use crate::runtime::validation_cache::ValidationCache;
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::Mutex;

    struct NoopExecutor;

    #[async_trait]
    impl CommandExecutor for NoopExecutor {
        async fn execute(
            &self,
            _cmd: &str,
            _timeout_secs: u64,
        ) -> Result<CommandOutput, CommandExecutorError> {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    struct ScriptedLLM {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLMClient for ScriptedLLM {
        async fn send_message(
            &self,
            _messages: &[LLMMessage],
        ) -> Result<LLMReply, Box<dyn Error + Send + Sync>> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Ok(LLMReply {
                    content: "no action".to_string(),
                });
            }
            Ok(LLMReply {
                content: replies.remove(0),
            })
        }
    }

    struct NoopLLMClient;

    #[async_trait]
    impl LLMClient for NoopLLMClient {
        async fn send_message(
            &self,
            _messages: &[LLMMessage],
        ) -> Result<LLMReply, Box<dyn Error + Send + Sync>> {
            unimplemented!("orchestrator tests never launch a real subagent turn")
        }
    }

    fn build_turn_executor() -> Arc<TurnExecutor> {
        let executor: Arc<dyn CommandExecutor> = Arc::new(NoopExecutor);
        let file_manager = Arc::new(FileManager::new(Arc::clone(&executor), None));
        let search_manager = Arc::new(SearchManager::new(Arc::clone(&executor), 100));
        let llm: Arc<dyn LLMClient> = Arc::new(NoopLLMClient);
        let dispatcher = Arc::new(ActionDispatcher::new(
            Arc::clone(&executor),
            file_manager,
            search_manager,
            Arc::new(TodoManager::new()),
            Arc::new(ScratchpadManager::new()),
            Arc::new(OrchestratorHub::new()),
            Arc::new(MetricsCollector::new(1000, None)),
            3,
            llm,
            3,
        ));
        let cache = Arc::new(ValidationCache::new(3600, 10, None));
        Arc::new(TurnExecutor::new(dispatcher, Arc::new(BuildValidator::new(executor, cache))))
    }

    #[tokio::test]
    async fn orchestrator_finishes_on_finish_action() {
        let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLLM {
            replies: Mutex::new(vec!["<finish>\nmessage: all good\n</finish>".to_string()]),
        });
        let mut orchestrator = Orchestrator::new(
            llm,
            build_turn_executor(),
            &RuntimeConfig::default(),
            "system prompt",
            "do the thing",
        );
        match orchestrator.run().await {
            OrchestratorOutcome::Finished { message, turns_used } => {
                assert_eq!(message, "all good");
                assert_eq!(turns_used, 1);
            }
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn orchestrator_stops_at_max_turns() {
        let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLLM {
            replies: Mutex::new(vec![]),
        });
        let config = RuntimeConfig {
            max_turns: 3,
            ..RuntimeConfig::default()
        };
        let mut orchestrator = Orchestrator::new(
            llm,
            build_turn_executor(),
            &config,
            "system prompt",
            "do the thing",
        );
        match orchestrator.run().await {
            OrchestratorOutcome::MaxTurnsReached { turns_used } => assert_eq!(turns_used, 3),
            other => panic!("expected MaxTurnsReached, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_user_turn_carries_the_instruction_under_current_task_heading() {
        let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLLM {
            replies: Mutex::new(vec!["<finish>\nmessage: ok\n</finish>".to_string()]),
        });
        let mut orchestrator = Orchestrator::new(
            llm,
            build_turn_executor(),
            &RuntimeConfig::default(),
            "system prompt",
            "investigate the crash",
        );
        orchestrator.run().await;
        let first_user = orchestrator
            .history
            .messages()
            .iter()
            .find(|m| m.role == LLMRole::User)
            .expect("a user message should have been pushed");
        assert!(first_user.content.starts_with("## Current Task\ninvestigate the crash"));
    }
}
