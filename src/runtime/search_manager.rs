//! Search Manager (C5): grep/glob/ls atop the executor.
//!
//! Grounded on `tools/bash.rs`'s shelling pattern combined with
//! `tools/filesystem.rs`'s directory-listing shape, but dispatches through
//! [`CommandExecutor`] rather than `std::fs`, matching `file_manager.rs`.

use std::fmt;
use std::sync::Arc;

use crate::runtime::executor::CommandExecutor;

#[derive(Debug)]
pub struct SearchError(pub String);

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search failed: {}", self.0)
    }
}

impl std::error::Error for SearchError {}

/// Result of a search operation, truncated to `limit` lines with a
/// trailing notice when the underlying command produced more.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub lines: Vec<String>,
    pub truncated: bool,
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn truncate(mut lines: Vec<String>, limit: usize) -> SearchResult {
    let truncated = lines.len() > limit;
    lines.truncate(limit);
    SearchResult { lines, truncated }
}

pub struct SearchManager {
    executor: Arc<dyn CommandExecutor>,
    match_limit: usize,
}

impl SearchManager {
    pub fn new(executor: Arc<dyn CommandExecutor>, match_limit: usize) -> Self {
        Self {
            executor,
            match_limit,
        }
    }

    pub async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        include: Option<&str>,
    ) -> Result<SearchResult, SearchError> {
        let target = path.unwrap_or(".");
        let include_flag = include
            .map(|glob| format!(" --include={}", shell_quote(glob)))
            .unwrap_or_default();
        let cmd = format!(
            "grep -rn{} -- {} {}",
            include_flag,
            shell_quote(pattern),
            shell_quote(target)
        );
        let output = self
            .executor
            .execute(&cmd, 30)
            .await
            .map_err(|e| SearchError(e.to_string()))?;
        // grep exits 1 for "no matches", which is a valid empty result, not
        // a failure; only a genuine non-0/1 exit indicates an error.
        if output.exit_code != 0 && output.exit_code != 1 {
            return Err(SearchError(output.stderr));
        }
        let lines: Vec<String> = output.stdout.lines().map(str::to_string).collect();
        Ok(truncate(lines, self.match_limit))
    }

    pub async fn glob(&self, pattern: &str, path: Option<&str>) -> Result<SearchResult, SearchError> {
        let target = path.unwrap_or(".");
        // `**/` has no special meaning to `find -name`; collapse it to a
        // single-level wildcard rather than silently matching nothing.
        let collapsed = pattern.replace("**/", "*/");
        let cmd = format!(
            "find {} -name {} -type f | head -n {} | sort",
            shell_quote(target),
            shell_quote(&collapsed),
            self.match_limit
        );
        let output = self
            .executor
            .execute(&cmd, 30)
            .await
            .map_err(|e| SearchError(e.to_string()))?;
        if !output.success() {
            return Err(SearchError(output.stderr));
        }
        let lines: Vec<String> = output.stdout.lines().map(str::to_string).collect();
        Ok(truncate(lines, self.match_limit))
    }

    pub async fn ls(&self, path: &str, ignore: &[String]) -> Result<SearchResult, SearchError> {
        let cmd = format!("ls -la {}", shell_quote(path));
        let output = self
            .executor
            .execute(&cmd, 15)
            .await
            .map_err(|e| SearchError(e.to_string()))?;
        if !output.success() {
            return Err(SearchError(output.stderr));
        }
        // `ls -la` output is long-format: a `total N` header, one line per
        // entry. Ignore patterns and the `.`/`..` drop apply to the entry's
        // filename field (the last whitespace-separated token), not the
        // whole line — the header and blank lines are always kept.
        let lines: Vec<String> = output
            .stdout
            .lines()
            .filter(|line| {
                if line.trim().is_empty() || line.starts_with("total ") {
                    return true;
                }
                let name = match line.split_whitespace().last() {
                    Some(n) => n,
                    None => return true,
                };
                if name == "." || name == ".." {
                    return false;
                }
                !ignore.iter().any(|pat| glob_match(pat, name))
            })
            .map(str::to_string)
            .collect();
        Ok(truncate(lines, self.match_limit))
    }
}

/// `*`-only glob match, sufficient for ignore patterns like `*.lock`. A
/// pattern with no wildcard falls back to substring containment rather
/// than exact equality, matching the shell's loose "contains" ignore
/// semantics for bare fragments.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        return candidate.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    candidate.contains(pattern)
}
