//! Error classification and retry engine (C7).
//!
//! Grounded on `tools/bash.rs`'s `BashError` enum/`Display` idiom, widened
//! into a general six-way taxonomy applied to any command/tool failure
//! text so the dispatcher and turn executor can decide whether a failure
//! is worth retrying.

use rand::Rng as _;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Taxonomy of failure causes a command or action result can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permission,
    NotFound,
    Syntax,
    Permanent,
    Unknown,
}

impl ErrorKind {
    /// Only transient failures, plus an unknown failure whose exit code
    /// isn't in the signal-killed range (>=128), are retried automatically
    /// (P8). A signal-killed unknown failure is treated as permanent since
    /// retrying won't change the outcome of a process that was killed.
    pub fn is_retriable(&self, exit_code: Option<i32>) -> bool {
        match self {
            ErrorKind::Transient => true,
            ErrorKind::Unknown => exit_code.map(|c| c < 128).unwrap_or(true),
            _ => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Ordered pattern table; first match wins. Order matters because some
/// patterns (e.g. "permission denied") are more specific than generic
/// ones and must be checked first.
const PATTERNS: &[(&str, ErrorKind)] = &[
    ("permission denied", ErrorKind::Permission),
    ("operation not permitted", ErrorKind::Permission),
    ("no such file or directory", ErrorKind::NotFound),
    ("not found", ErrorKind::NotFound),
    ("cannot find", ErrorKind::NotFound),
    ("syntax error", ErrorKind::Syntax),
    ("unexpected token", ErrorKind::Syntax),
    ("parse error", ErrorKind::Syntax),
    ("connection refused", ErrorKind::Transient),
    ("connection reset", ErrorKind::Transient),
    ("timed out", ErrorKind::Transient),
    ("timeout", ErrorKind::Transient),
    ("temporarily unavailable", ErrorKind::Transient),
    ("resource busy", ErrorKind::Transient),
    ("too many open files", ErrorKind::Transient),
    ("out of memory", ErrorKind::Permanent),
    ("disk quota exceeded", ErrorKind::Permanent),
    ("no space left on device", ErrorKind::Permanent),
];

/// Classify a failure by its message text and, if known, exit code.
///
/// The text-pattern table is checked first since it carries the most
/// specific signal; an exit code only disambiguates failures the message
/// text doesn't already explain. Exit code 124 is our own timeout
/// wrapper's SIGTERM and is treated as transient; 130/137/143 (SIGINT,
/// SIGKILL, SIGTERM delivered directly to the child) are treated as
/// permanent, since retrying a killed process changes nothing.
pub fn classify(message: &str, exit_code: Option<i32>) -> ErrorKind {
    let lower = message.to_lowercase();
    for (pattern, kind) in PATTERNS {
        if lower.contains(pattern) {
            return *kind;
        }
    }
    match exit_code {
        Some(2) => ErrorKind::Syntax,
        Some(124) => ErrorKind::Transient,
        Some(126) => ErrorKind::Permission,
        Some(127) => ErrorKind::NotFound,
        Some(130) | Some(137) | Some(143) => ErrorKind::Permanent,
        _ => ErrorKind::Unknown,
    }
}

/// Exponential backoff with jitter, capped at 30s, used between retries.
pub fn backoff_duration(attempt: u32) -> Duration {
    let base_ms = 250u64.saturating_mul(1u64 << attempt.min(7));
    let capped_ms = base_ms.min(30_000);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped_ms / 4 + 1);
    Duration::from_millis(capped_ms + jitter_ms)
}

/// Retry `op` up to `max_attempts` times (including the first), classifying
/// each failure and stopping early on a non-retriable kind (P8).
///
/// `classify_err` turns the operation's error into `(message, exit_code)`
/// for classification purposes.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: u32,
    mut op: F,
    classify_err: impl Fn(&E) -> (String, Option<i32>),
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let (message, exit_code) = classify_err(&err);
                let kind = classify(&message, exit_code);
                if attempt >= max_attempts || !kind.is_retriable(exit_code) {
                    return Err(err);
                }
                log::warn!(
                    "attempt {}/{} failed ({}), retrying: {}",
                    attempt,
                    max_attempts,
                    kind,
                    message
                );
                tokio::time::sleep(backoff_duration(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_permission_denied() {
        assert_eq!(classify("bash: ./run.sh: Permission denied", Some(126)), ErrorKind::Permission);
    }

    #[test]
    fn classifies_not_found() {
        assert_eq!(classify("ls: cannot access 'x': No such file or directory", Some(2)), ErrorKind::NotFound);
    }

    #[test]
    fn classifies_timeout_wrapper_exit_code_as_transient() {
        assert_eq!(classify("anything", Some(124)), ErrorKind::Transient);
    }

    #[test]
    fn classifies_signal_killed_exit_codes_as_permanent() {
        assert_eq!(classify("anything", Some(130)), ErrorKind::Permanent);
        assert_eq!(classify("anything", Some(137)), ErrorKind::Permanent);
        assert_eq!(classify("anything", Some(143)), ErrorKind::Permanent);
    }

    #[test]
    fn classifies_unknown_when_nothing_matches() {
        assert_eq!(classify("some bespoke failure", Some(1)), ErrorKind::Unknown);
    }

    #[test]
    fn unknown_is_retriable_only_below_signal_range() {
        assert!(ErrorKind::Unknown.is_retriable(Some(1)));
        assert!(!ErrorKind::Unknown.is_retriable(Some(137)));
        assert!(ErrorKind::Unknown.is_retriable(None));
    }

    #[test]
    fn permanent_is_never_retriable_regardless_of_exit_code() {
        assert!(!ErrorKind::Permanent.is_retriable(Some(1)));
    }

    #[test]
    fn backoff_is_capped_at_thirty_seconds_plus_jitter() {
        let d = backoff_duration(20);
        assert!(d.as_millis() <= 30_000 + 30_000 / 4 + 1);
    }

    #[tokio::test]
    async fn with_retry_stops_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), String> = with_retry(
            3,
            || {
                calls += 1;
                async { Err::<(), String>("connection refused".to_string()) }
            },
            |e| (e.clone(), None),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn with_retry_stops_immediately_on_non_retriable() {
        let mut calls = 0;
        let result: Result<(), String> = with_retry(
            3,
            || {
                calls += 1;
                async { Err::<(), String>("permission denied".to_string()) }
            },
            |e| (e.clone(), None),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
