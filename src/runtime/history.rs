//! Sliding-window conversation history.
//!
//! Grounded directly on `llm_session.rs`'s `trim_conversation_history` and
//! its char/4 token approximation — this crate has no tokenizer dependency,
//! same as the teacher.

use crate::runtime::executor::{LLMMessage, LLMRole};

/// Approximates token count as `max(1, chars / 4)`, matching
/// `llm_session.rs::count_tokens`.
pub fn count_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

pub fn count_message_tokens(message: &LLMMessage) -> usize {
    1 + count_tokens(&message.content)
}

/// Bounded, oldest-eviction conversation history, mirroring
/// `LLMSession`'s turn-trimming behavior but generalized to a turn-count
/// bound rather than only a token bound, since the orchestrator's
/// `max_history_turns` (§4.12) caps turns directly.
pub struct ConversationHistory {
    messages: Vec<LLMMessage>,
    max_tokens: usize,
    max_turns: usize,
    token_count: usize,
}

impl ConversationHistory {
    pub fn new(max_tokens: usize, max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_tokens,
            max_turns,
            token_count: 0,
        }
    }

    pub fn push(&mut self, message: LLMMessage) {
        self.token_count += count_message_tokens(&message);
        self.messages.push(message);
        self.trim();
    }

    fn trim(&mut self) {
        while self.token_count > self.max_tokens && !self.messages.is_empty() {
            let removed = self.messages.remove(0);
            self.token_count -= count_message_tokens(&removed);
        }
        while self.messages.len() > self.max_turns {
            let removed = self.messages.remove(0);
            self.token_count -= count_message_tokens(&removed);
        }
    }

    pub fn messages(&self) -> &[LLMMessage] {
        &self.messages
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Renders a turn's state summary for the next prompt. Agent/LLM output is
/// clipped at 500 chars; environment/tool responses are left untouched.
/// This asymmetry is a retained quirk (§9), not something to "fix" by
/// clipping both sides evenly.
pub fn render_turn_summary(agent_output: &str, env_response: &str) -> String {
    let clipped = if agent_output.len() > 500 {
        format!("{}... [truncated]", &agent_output[..500])
    } else {
        agent_output.to_string()
    };
    format!("{}\n\n{}", clipped, env_response)
}

pub fn llm_message(role: LLMRole, content: impl Into<String>) -> LLMMessage {
    LLMMessage::new(role, content)
}
