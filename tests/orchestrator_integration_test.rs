//! End-to-end integration tests driving the orchestrator and file manager
//! against a real shell, in the teacher's `tests/*.rs` + `tempfile::TempDir`
//! style (see `tests/filesystem_tool_test.rs` in the original pack).

use std::error::Error;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loopsmith::runtime::build_validation::BuildValidator;
use loopsmith::runtime::dispatcher::ActionDispatcher;
use loopsmith::runtime::file_manager::FileManager;
use loopsmith::runtime::hub::OrchestratorHub;
use loopsmith::runtime::metrics::MetricsCollector;
use loopsmith::runtime::search_manager::SearchManager;
use loopsmith::runtime::state::{ScratchpadManager, TodoManager};
use loopsmith::runtime::turn_executor::TurnExecutor;
use loopsmith::runtime::validation_cache::ValidationCache;
use loopsmith::{
    CommandExecutor, CommandOutput, LLMClient, LLMMessage, LLMReply, Orchestrator,
    OrchestratorOutcome, RuntimeConfig,
};
use tempfile::TempDir;
use tokio::process::Command;

/// Minimal real shell executor, grounded on `tools/bash.rs`'s
/// `tokio::process::Command` pattern, used only to drive these
/// integration tests against an actual shell.
struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(
        &self,
        cmd: &str,
        timeout_secs: u64,
    ) -> Result<CommandOutput, loopsmith::runtime::executor::CommandExecutorError> {
        use loopsmith::runtime::executor::CommandExecutorError;
        let fut = Command::new("sh").arg("-c").arg(cmd).output();
        let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), fut)
            .await
            .map_err(|_| CommandExecutorError::Timeout)?
            .map_err(|e| CommandExecutorError::Io(e.to_string()))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
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
        unimplemented!("integration tests never launch a real subagent turn")
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
                content: "<finish>\nmessage: nothing left to do\n</finish>".to_string(),
            });
        }
        Ok(LLMReply {
            content: replies.remove(0),
        })
    }
}

fn build_turn_executor() -> Arc<TurnExecutor> {
    let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor);
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
async fn write_then_read_round_trips_through_a_real_shell() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("greeting.txt");
    let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor);
    let manager = FileManager::new(executor, None);

    manager
        .write_file(path.to_str().unwrap(), "hello from the write chain")
        .await
        .expect("write should succeed via some strategy");

    let content = manager
        .read_file(path.to_str().unwrap(), None, None)
        .await
        .expect("read should succeed");
    assert!(content.contains("hello from the write chain"));
}

#[tokio::test]
async fn edit_file_rolls_back_cleanly_when_old_string_is_absent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.txt");
    std::fs::write(&path, "original content\n").unwrap();
    let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor);
    let manager = FileManager::new(executor, None);

    let result = manager
        .edit_file(
            path.to_str().unwrap(),
            "text that is not present",
            "replacement",
            false,
        )
        .await;
    assert!(result.is_err());

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "original content\n");
}

#[tokio::test]
async fn orchestrator_runs_a_bash_action_then_finishes() {
    let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLLM {
        replies: Mutex::new(vec![
            "<bash>\ncmd: echo orchestrated\n</bash>".to_string(),
            "<finish>\nmessage: task complete\n</finish>".to_string(),
        ]),
    });
    let mut orchestrator = Orchestrator::new(
        llm,
        build_turn_executor(),
        &RuntimeConfig::default(),
        "you are an autonomous coding agent",
        "print a greeting then finish",
    );

    match orchestrator.run().await {
        OrchestratorOutcome::Finished { message, turns_used } => {
            assert_eq!(message, "task complete");
            assert_eq!(turns_used, 2);
        }
        other => panic!("expected Finished, got {:?}", other),
    }
}

#[tokio::test]
async fn orchestrator_refuses_finish_right_after_an_unresolved_parse_error() {
    let llm: Arc<dyn LLMClient> = Arc::new(ScriptedLLM {
        replies: Mutex::new(vec![
            "<bogus_tag>\nfoo: bar\n</bogus_tag>\n<finish>\nmessage: too soon\n</finish>"
                .to_string(),
            "<finish>\nmessage: now it is done\n</finish>".to_string(),
        ]),
    });
    let mut orchestrator = Orchestrator::new(
        llm,
        build_turn_executor(),
        &RuntimeConfig::default(),
        "you are an autonomous coding agent",
        "recover from a bad tag and finish",
    );

    match orchestrator.run().await {
        OrchestratorOutcome::Finished { message, turns_used } => {
            assert_eq!(message, "now it is done");
            assert_eq!(turns_used, 2);
        }
        other => panic!("expected eventual Finished, got {:?}", other),
    }
}
