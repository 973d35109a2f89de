//! External interfaces: command execution and LLM access.
//!
//! Neither the shell/container executor nor the LLM HTTP client is
//! implemented here — both are named external collaborators the rest of
//! the runtime is written against. Grounded on `client_wrapper.rs`'s
//! `ClientWrapper` trait-object pattern: a `Send + Sync` async trait with
//! no concrete implementation bundled in this crate.

use async_trait::async_trait;
use std::error::Error;
use std::fmt;

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLMRole {
    System,
    User,
    Assistant,
}

/// One message in the conversation sent to [`LLMClient::send_message`].
#[derive(Debug, Clone)]
pub struct LLMMessage {
    pub role: LLMRole,
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: LLMRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The model's reply to a [`LLMClient::send_message`] call.
#[derive(Debug, Clone)]
pub struct LLMReply {
    pub content: String,
}

/// External LLM collaborator. No concrete implementation (provider HTTP
/// client, auth, retries-at-the-wire) lives in this crate; callers plug in
/// their own.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Send the full conversation and return the assistant's next message.
    async fn send_message(
        &self,
        messages: &[LLMMessage],
    ) -> Result<LLMReply, Box<dyn Error + Send + Sync>>;

    /// Human-readable model identifier, used only in logging.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Result of running a single shell command via [`CommandExecutor`].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Error surfaced by a [`CommandExecutor`] implementation.
#[derive(Debug)]
pub enum CommandExecutorError {
    Timeout,
    Io(String),
}

impl fmt::Display for CommandExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandExecutorError::Timeout => write!(f, "command timed out"),
            CommandExecutorError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl Error for CommandExecutorError {}

/// External shell/container collaborator. The File Manager, Search
/// Manager, and build-validation probes all run every operation as a
/// shell pipeline through this trait rather than touching the filesystem
/// directly — grounded on `tools/bash.rs`'s `tokio::process::Command`
/// shelling pattern, generalized behind a trait boundary so the concrete
/// sandbox (local process, container, remote) stays external.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `cmd` through a shell, waiting up to `timeout_secs` for completion.
    async fn execute(
        &self,
        cmd: &str,
        timeout_secs: u64,
    ) -> Result<CommandOutput, CommandExecutorError>;
}
