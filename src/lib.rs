// src/lib.rs

// Import the top-level `runtime` module.
pub mod runtime;

// Re-exporting key items for easier external access.
pub use runtime::action::{Action, ActionValidationError};
pub use runtime::config::RuntimeConfig;
pub use runtime::dispatcher::ActionDispatcher;
pub use runtime::executor::{CommandExecutor, CommandOutput, LLMClient, LLMMessage, LLMReply, LLMRole};
pub use runtime::orchestrator::{Orchestrator, OrchestratorOutcome};
pub use runtime::parser::{ParseOutcome, ResponseParser};
pub use runtime::turn_executor::{TurnExecutor, TurnOutcome};

/// Initialize the `env_logger` backend for `log` macros used throughout the crate.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(false).try_init();
}
