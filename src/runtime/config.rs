//! Runtime configuration.
//!
//! Provides [`RuntimeConfig`], the single place that turn budgets, retry
//! policy, cache sizing, and metrics sizing are tuned. Users construct this
//! manually in code — no TOML/YAML/JSON config-file parsing is introduced.
//!
//! # Example
//!
//! ```rust
//! use loopsmith::RuntimeConfig;
//!
//! let config = RuntimeConfig::default();
//! assert_eq!(config.max_turns, 50);
//!
//! let config = RuntimeConfig {
//!     max_turns: 20,
//!     ..RuntimeConfig::default()
//! };
//! assert_eq!(config.max_turns, 20);
//! ```

use std::path::PathBuf;

/// Global tunables for the turn loop, retry engine, validation cache, and
/// metrics collector.
///
/// This struct is intentionally minimal; fields map 1:1 onto the defaults
/// named throughout the specification (`maxTurns`, `maxRetryAttempts`, cache
/// TTL, etc).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of orchestrator turns before giving up (`--max-turns`).
    pub max_turns: usize,
    /// Sliding-window bound on retained conversation turns.
    pub max_history_turns: usize,
    /// Maximum attempts (including the first) made by `withRetry`.
    pub max_retry_attempts: u32,
    /// Validation cache entry time-to-live.
    pub cache_ttl_secs: i64,
    /// Validation cache LRU eviction bound.
    pub cache_max_entries: usize,
    /// Metrics ring-buffer capacity.
    pub metrics_ring_size: usize,
    /// Cap applied to grep/glob result lines before a truncation notice is appended.
    pub search_match_limit: usize,
    /// Directory validation-cache persistence is written to, if any.
    pub cache_persist_dir: Option<PathBuf>,
    /// Directory metrics JSONL persistence is written to, if any.
    pub metrics_persist_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    /// Mirrors the defaults named throughout the specification: 50 turns,
    /// a 100-turn history window, 3 retry attempts, a 24h cache TTL, a
    /// 1000-entry metrics ring buffer, and 100-line search truncation.
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_history_turns: 100,
            max_retry_attempts: 3,
            cache_ttl_secs: 24 * 60 * 60,
            cache_max_entries: 500,
            metrics_ring_size: 1000,
            search_match_limit: 100,
            cache_persist_dir: None,
            metrics_persist_dir: None,
        }
    }
}
