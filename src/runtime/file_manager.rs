//! File Manager (C4): read/write/edit/multi-edit/metadata.
//!
//! Every operation runs as a shell pipeline through a [`CommandExecutor`]
//! rather than touching the filesystem directly, grounded on
//! `tools/bash.rs`'s `tokio::process::Command` shelling pattern. The error
//! enum's `Display` idiom is grounded on `tools/filesystem.rs`'s
//! `FileSystemError`, though the access method itself (shell pipeline vs
//! direct `std::fs`) is new — the spec requires operations to go through
//! the same sandboxed executor bash commands do.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;

use crate::runtime::executor::CommandExecutor;
use crate::runtime::validation_cache::ValidationCache;

#[derive(Debug)]
pub enum FileManagerError {
    CommandFailed(String),
    VerificationFailed(String),
    AllStrategiesFailed(String),
    TooManyPaths,
}

impl fmt::Display for FileManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileManagerError::CommandFailed(msg) => write!(f, "command failed: {}", msg),
            FileManagerError::VerificationFailed(msg) => {
                write!(f, "edit verification failed: {}", msg)
            }
            FileManagerError::AllStrategiesFailed(msg) => {
                write!(f, "all strategies failed: {}", msg)
            }
            FileManagerError::TooManyPaths => write!(f, "at most 10 paths may be queried at once"),
        }
    }
}

impl std::error::Error for FileManagerError {}

#[derive(Debug, Clone)]
pub struct FileMetadataEntry {
    pub path: String,
    pub size: u64,
    pub modified_epoch_secs: u64,
    pub is_directory: bool,
    pub exists: bool,
}

/// Which strategy ultimately succeeded, surfaced for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NodeHelper,
    PythonHelper,
    Heredoc,
    Printf,
    Sed,
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Runs every file operation as a shell pipeline through a [`CommandExecutor`].
pub struct FileManager {
    executor: Arc<dyn CommandExecutor>,
    cache: Option<Arc<ValidationCache>>,
}

impl FileManager {
    pub fn new(executor: Arc<dyn CommandExecutor>, cache: Option<Arc<ValidationCache>>) -> Self {
        Self { executor, cache }
    }

    /// Reads `path`, optionally restricted to a 1-based `offset`/`limit`
    /// window, via a `sed` range piped through `cat -n` for line numbers.
    pub async fn read_file(
        &self,
        path: &str,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<String, FileManagerError> {
        let start = offset.unwrap_or(0) + 1;
        let cmd = match limit {
            Some(limit) => {
                let end = start + limit.saturating_sub(1);
                format!(
                    "sed -n '{},{}p' {} | cat -n",
                    start,
                    end,
                    shell_quote(path)
                )
            }
            None if offset.is_some() => {
                format!("tail -n +{} {} | cat -n", start, shell_quote(path))
            }
            None => format!("cat -n {}", shell_quote(path)),
        };
        let output = self
            .executor
            .execute(&cmd, 30)
            .await
            .map_err(|e| FileManagerError::CommandFailed(e.to_string()))?;
        if !output.success() {
            return Err(FileManagerError::CommandFailed(output.stderr));
        }
        Ok(output.stdout)
    }

    /// Writes `content` to `path`, trying node, then python, then a shell
    /// heredoc, then `printf`, stopping at the first strategy that
    /// succeeds.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
    ) -> Result<Strategy, FileManagerError> {
        let b64 = base64::engine::general_purpose::STANDARD.encode(content);
        let attempts: Vec<(Strategy, String)> = vec![
            (
                Strategy::NodeHelper,
                format!(
                    "node -e \"require('fs').writeFileSync(process.argv[1], Buffer.from(process.argv[2],'base64'))\" {} {}",
                    shell_quote(path),
                    shell_quote(&b64)
                ),
            ),
            (
                Strategy::PythonHelper,
                format!(
                    "python3 -c \"import sys,base64; open(sys.argv[1],'wb').write(base64.b64decode(sys.argv[2]))\" {} {}",
                    shell_quote(path),
                    shell_quote(&b64)
                ),
            ),
            (
                Strategy::Heredoc,
                format!(
                    "cat > {} << 'LOOPSMITH_EOF'\n{}\nLOOPSMITH_EOF",
                    shell_quote(path),
                    content
                ),
            ),
            (
                Strategy::Printf,
                format!("printf '%s' {} > {}", shell_quote(content), shell_quote(path)),
            ),
        ];

        let mut last_err = String::new();
        for (strategy, cmd) in attempts {
            match self.executor.execute(&cmd, 30).await {
                Ok(output) if output.success() => {
                    if let Some(cache) = &self.cache {
                        cache.invalidate_file(std::path::Path::new(path));
                    }
                    return Ok(strategy);
                }
                Ok(output) => last_err = output.stderr,
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(FileManagerError::AllStrategiesFailed(last_err))
    }

    /// Replaces `old_string` with `new_string` in `path`. Backs up the
    /// file, tries node, then python, then (only when neither string spans
    /// multiple lines) `sed`, verifying each attempt by re-reading the
    /// file; a failed verification rolls back to the backup before the
    /// next strategy is tried.
    pub async fn edit_file(
        &self,
        path: &str,
        old_string: &str,
        new_string: &str,
        replace_all: bool,
    ) -> Result<Strategy, FileManagerError> {
        let backup_path = format!("{}.loopsmith.bak", path);
        let backup_cmd = format!("cp {} {}", shell_quote(path), shell_quote(&backup_path));
        self.executor
            .execute(&backup_cmd, 30)
            .await
            .map_err(|e| FileManagerError::CommandFailed(e.to_string()))?;

        let mut strategies: Vec<(Strategy, String)> = vec![
            (
                Strategy::NodeHelper,
                node_edit_cmd(path, old_string, new_string, replace_all),
            ),
            (
                Strategy::PythonHelper,
                python_edit_cmd(path, old_string, new_string, replace_all),
            ),
        ];
        // sed operates line-by-line; a multi-line old/new string can't be
        // expressed safely, so this fallback is skipped for those.
        if !old_string.contains('\n') && !new_string.contains('\n') {
            strategies.push((Strategy::Sed, sed_edit_cmd(path, old_string, new_string, replace_all)));
        }

        let mut last_err = String::new();
        for (strategy, cmd) in strategies {
            let attempt = self.executor.execute(&cmd, 30).await;
            let applied = matches!(&attempt, Ok(o) if o.success());
            if !applied {
                last_err = match attempt {
                    Ok(o) => o.stderr,
                    Err(e) => e.to_string(),
                };
                continue;
            }
            match self.verify_edit(path, new_string).await {
                Ok(true) => {
                    if let Some(cache) = &self.cache {
                        cache.invalidate_file(std::path::Path::new(path));
                    }
                    let _ = self
                        .executor
                        .execute(&format!("rm -f {}", shell_quote(&backup_path)), 10)
                        .await;
                    return Ok(strategy);
                }
                Ok(false) => {
                    self.restore_backup(path, &backup_path).await;
                    last_err = "post-edit content did not contain new_string".to_string();
                }
                Err(e) => {
                    self.restore_backup(path, &backup_path).await;
                    last_err = e.to_string();
                }
            }
        }
        self.restore_backup(path, &backup_path).await;
        Err(FileManagerError::AllStrategiesFailed(last_err))
    }

    async fn verify_edit(&self, path: &str, new_string: &str) -> Result<bool, FileManagerError> {
        let content = self.read_file(path, None, None).await?;
        Ok(content.contains(new_string))
    }

    async fn restore_backup(&self, path: &str, backup_path: &str) {
        let cmd = format!("cp {} {}", shell_quote(backup_path), shell_quote(path));
        let _ = self.executor.execute(&cmd, 30).await;
    }

    /// Applies a sequence of edits in order, stopping at (and reporting)
    /// the first failure rather than attempting remaining edits.
    pub async fn multi_edit_file(
        &self,
        path: &str,
        edits: &[(String, String, bool)],
    ) -> Result<Vec<Strategy>, FileManagerError> {
        let mut applied = Vec::with_capacity(edits.len());
        for (old_string, new_string, replace_all) in edits {
            let strategy = self
                .edit_file(path, old_string, new_string, *replace_all)
                .await?;
            applied.push(strategy);
        }
        Ok(applied)
    }

    /// Fetches size/mtime/kind for up to 10 paths via `stat`.
    pub async fn get_metadata(
        &self,
        paths: &[String],
    ) -> Result<Vec<FileMetadataEntry>, FileManagerError> {
        if paths.is_empty() || paths.len() > 10 {
            return Err(FileManagerError::TooManyPaths);
        }
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let cmd = format!(
                "stat -c '%s %Y %F' {} 2>/dev/null || echo MISSING",
                shell_quote(path)
            );
            let output = self
                .executor
                .execute(&cmd, 10)
                .await
                .map_err(|e| FileManagerError::CommandFailed(e.to_string()))?;
            let line = output.stdout.trim();
            if line.is_empty() || line == "MISSING" {
                out.push(FileMetadataEntry {
                    path: path.clone(),
                    size: 0,
                    modified_epoch_secs: 0,
                    is_directory: false,
                    exists: false,
                });
                continue;
            }
            let mut parts = line.splitn(3, ' ');
            let size = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let modified = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let kind = parts.next().unwrap_or("");
            out.push(FileMetadataEntry {
                path: path.clone(),
                size,
                modified_epoch_secs: modified,
                is_directory: kind.contains("directory"),
                exists: true,
            });
        }
        Ok(out)
    }
}

fn node_edit_cmd(path: &str, old: &str, new: &str, replace_all: bool) -> String {
    let old_b64 = base64::engine::general_purpose::STANDARD.encode(old);
    let new_b64 = base64::engine::general_purpose::STANDARD.encode(new);
    let replace_call = if replace_all {
        "s.split(o).join(n)"
    } else {
        "s.replace(o, n)"
    };
    format!(
        "node -e \"const fs=require('fs');const o=Buffer.from(process.argv[2],'base64').toString();const n=Buffer.from(process.argv[3],'base64').toString();const s=fs.readFileSync(process.argv[1],'utf8');fs.writeFileSync(process.argv[1], {})\" {} {} {}",
        replace_call,
        shell_quote(path),
        shell_quote(&old_b64),
        shell_quote(&new_b64)
    )
}

fn python_edit_cmd(path: &str, old: &str, new: &str, replace_all: bool) -> String {
    let old_b64 = base64::engine::general_purpose::STANDARD.encode(old);
    let new_b64 = base64::engine::general_purpose::STANDARD.encode(new);
    let count = if replace_all { "" } else { ", 1" };
    format!(
        "python3 -c \"import sys,base64\\no=base64.b64decode(sys.argv[2]).decode()\\nn=base64.b64decode(sys.argv[3]).decode()\\np=sys.argv[1]\\ns=open(p).read()\\nopen(p,'w').write(s.replace(o,n{}))\" {} {} {}",
        count,
        shell_quote(path),
        shell_quote(&old_b64),
        shell_quote(&new_b64)
    )
}

fn sed_edit_cmd(path: &str, old: &str, new: &str, replace_all: bool) -> String {
    let escape = |s: &str| {
        s.replace('\\', "\\\\")
            .replace('/', "\\/")
            .replace('&', "\\&")
    };
    let flag = if replace_all { "g" } else { "" };
    format!(
        "sed -i 's/{}/{}/{}' {}",
        escape(old),
        escape(new),
        flag,
        shell_quote(path)
    )
}
