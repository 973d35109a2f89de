//! Best-effort build validation (§4.10).
//!
//! Unlike a linter run per changed file, this probes the *project*: it
//! looks for the manifest a toolchain would key off (`package.json`,
//! `requirements.txt`, `tsconfig.json`, `Makefile`) and only runs that
//! toolchain's build/check command when the manifest is present. A repo
//! with no recognized manifest reports `Info` rather than being treated
//! as a failure. Grounded on `tools/bash.rs`'s shell-exec pattern;
//! integrates with [`ValidationCache`] so a repeated probe against
//! unchanged files and dependencies is served from cache, prefixed with
//! `[CACHED]` so the turn loop can tell a fresh run from a replayed one.

use std::path::PathBuf;
use std::sync::Arc;

use crate::runtime::executor::CommandExecutor;
use crate::runtime::validation_cache::{cache_key, ValidationCache, ValidationSeverity};

const MAX_PYTHON_FILES: usize = 10;
const MAX_CPP_FILES: usize = 5;

const CRITICAL_PATTERNS: &[&str] = &[
    "syntaxerror",
    "parse error",
    "parseerror",
    "cannot find module",
    "module not found",
    "undefined reference",
    "fatal error",
    "compilation error",
    "error: expected",
];

const WARNING_PATTERNS: &[&str] = &[
    "warning:",
    "eslint",
    "unused",
    "deprecated",
    "fail",
    "tests failed",
    "error ts",
];

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Project-level toolchains this validator knows how to gate and invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Node,
    Python,
    TypeScript,
    Cpp,
    Make,
}

impl Probe {
    fn name(&self) -> &'static str {
        match self {
            Probe::Node => "node",
            Probe::Python => "python",
            Probe::TypeScript => "typescript",
            Probe::Cpp => "cpp",
            Probe::Make => "make",
        }
    }
}

/// Outcome of validating one or more files.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub severity: ValidationSeverity,
    pub message: String,
}

/// Categorizes raw probe output into a tier. A failing probe whose output
/// matches neither pattern list still defaults to `Critical` — an
/// unrecognized failure is safer to surface loudly than to let through as
/// a warning.
fn categorize(output: &str, success: bool) -> ValidationSeverity {
    let lower = output.to_lowercase();
    if !success {
        if CRITICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ValidationSeverity::Critical;
        }
        if WARNING_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ValidationSeverity::Warning;
        }
        return ValidationSeverity::Critical;
    }
    if WARNING_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ValidationSeverity::Warning;
    }
    ValidationSeverity::Info
}

fn severity_rank(s: &ValidationSeverity) -> u8 {
    match s {
        ValidationSeverity::Info => 0,
        ValidationSeverity::Warning => 1,
        ValidationSeverity::Critical => 2,
    }
}

pub struct BuildValidator {
    executor: Arc<dyn CommandExecutor>,
    cache: Arc<ValidationCache>,
}

impl BuildValidator {
    pub fn new(executor: Arc<dyn CommandExecutor>, cache: Arc<ValidationCache>) -> Self {
        Self { executor, cache }
    }

    async fn manifest_exists(&self, filename: &str) -> bool {
        matches!(
            self.executor.execute(&format!("test -f {}", shell_quote(filename)), 5).await,
            Ok(output) if output.success()
        )
    }

    async fn any_manifest_exists(&self, filenames: &[&str]) -> bool {
        for name in filenames {
            if self.manifest_exists(name).await {
                return true;
            }
        }
        false
    }

    /// Runs `cmd`, checking/populating the cache first so an unchanged
    /// manifest + file set is served without re-invoking the toolchain.
    async fn cached_or_run(&self, probe: Probe, fingerprint_files: Vec<PathBuf>, cmd: &str) -> ValidationReport {
        let key = cache_key(probe.name(), &fingerprint_files, &[]);
        if let Some(entry) = self.cache.get(&key) {
            return ValidationReport {
                severity: entry.severity,
                message: format!("[CACHED] {}", entry.message),
            };
        }

        let report = match self.executor.execute(cmd, 120).await {
            Ok(output) => {
                let text = if output.stderr.is_empty() { output.stdout.clone() } else { output.stderr.clone() };
                let severity = categorize(&text, output.success());
                let message = if output.success() && text.trim().is_empty() {
                    format!("{} passed", probe.name())
                } else {
                    text
                };
                ValidationReport { severity, message }
            }
            Err(e) => ValidationReport {
                severity: ValidationSeverity::Warning,
                message: format!("{} validator unavailable: {}", probe.name(), e),
            },
        };

        self.cache.insert(
            key,
            probe.name().to_string(),
            report.severity.clone(),
            report.message.clone(),
            fingerprint_files,
        );
        report
    }

    async fn run_node(&self) -> ValidationReport {
        let has_build_script = matches!(
            self.executor.execute("grep -q '\"build\"' package.json", 5).await,
            Ok(output) if output.success()
        );
        let cmd = if has_build_script { "npm run build" } else { "npm test" };
        self.cached_or_run(Probe::Node, vec![PathBuf::from("package.json")], cmd).await
    }

    async fn run_python(&self, changed_files: &[String]) -> ValidationReport {
        let py_files: Vec<&String> = changed_files
            .iter()
            .filter(|f| f.ends_with(".py"))
            .take(MAX_PYTHON_FILES)
            .collect();
        if py_files.is_empty() {
            return ValidationReport {
                severity: ValidationSeverity::Info,
                message: "no changed .py files to validate".to_string(),
            };
        }
        let quoted = py_files.iter().map(|f| shell_quote(f)).collect::<Vec<_>>().join(" ");
        let cmd = format!("python3 -m py_compile {}", quoted);
        let fingerprint = py_files.iter().map(|f| PathBuf::from(f.as_str())).collect();
        self.cached_or_run(Probe::Python, fingerprint, &cmd).await
    }

    async fn run_typescript(&self) -> ValidationReport {
        self.cached_or_run(Probe::TypeScript, vec![PathBuf::from("tsconfig.json")], "npx tsc --noEmit").await
    }

    async fn run_cpp(&self, changed_files: &[String]) -> ValidationReport {
        let cpp_files: Vec<&String> = changed_files
            .iter()
            .filter(|f| f.ends_with(".c") || f.ends_with(".cpp") || f.ends_with(".cc"))
            .take(MAX_CPP_FILES)
            .collect();
        if cpp_files.is_empty() {
            return ValidationReport {
                severity: ValidationSeverity::Info,
                message: "no changed C/C++ files to validate".to_string(),
            };
        }
        let cmd = cpp_files
            .iter()
            .map(|f| format!("g++ -c {} -o /tmp/test.o", shell_quote(f)))
            .collect::<Vec<_>>()
            .join(" && ");
        let fingerprint = cpp_files.iter().map(|f| PathBuf::from(f.as_str())).collect();
        self.cached_or_run(Probe::Cpp, fingerprint, &cmd).await
    }

    async fn run_make(&self) -> ValidationReport {
        self.cached_or_run(Probe::Make, vec![PathBuf::from("Makefile")], "make -n").await
    }

    /// Runs every manifest-gated probe applicable to `changed_files` and
    /// returns the worst severity observed (Critical > Warning > Info). A
    /// repo with no recognized manifest and no C/C++ sources among
    /// `changed_files` reports `Info`.
    pub async fn validate_files(&self, changed_files: &[String]) -> ValidationReport {
        let mut reports = Vec::new();

        if self.any_manifest_exists(&["package.json"]).await {
            reports.push(self.run_node().await);
        }
        if self.any_manifest_exists(&["requirements.txt", "setup.py", "pyproject.toml"]).await {
            reports.push(self.run_python(changed_files).await);
        }
        if self.any_manifest_exists(&["tsconfig.json"]).await {
            reports.push(self.run_typescript().await);
        }
        if changed_files
            .iter()
            .any(|f| f.ends_with(".c") || f.ends_with(".cpp") || f.ends_with(".cc"))
        {
            reports.push(self.run_cpp(changed_files).await);
        }
        if self.any_manifest_exists(&["Makefile"]).await {
            reports.push(self.run_make().await);
        }

        reports
            .into_iter()
            .max_by_key(|r| severity_rank(&r.severity))
            .unwrap_or(ValidationReport {
                severity: ValidationSeverity::Info,
                message: "no build system detected".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::executor::{CommandExecutorError, CommandOutput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Responds `success_for` to `test -f <name>` for each listed manifest
    /// name, and `probe_output` to everything else (the probe command
    /// itself).
    struct ManifestExecutor {
        manifests: Vec<&'static str>,
        probe_output: CommandOutput,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandExecutor for ManifestExecutor {
        async fn execute(&self, cmd: &str, _timeout_secs: u64) -> Result<CommandOutput, CommandExecutorError> {
            self.calls.lock().unwrap().push(cmd.to_string());
            if cmd.starts_with("test -f") {
                let present = self.manifests.iter().any(|m| cmd.contains(m));
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: if present { 0 } else { 1 },
                });
            }
            if cmd.starts_with("grep -q") {
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 1,
                });
            }
            Ok(self.probe_output.clone())
        }
    }

    #[tokio::test]
    async fn no_manifest_reports_info() {
        let executor = Arc::new(ManifestExecutor {
            manifests: vec![],
            probe_output: CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 },
            calls: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(ValidationCache::new(3600, 10, None));
        let validator = BuildValidator::new(executor, cache);
        let report = validator.validate_files(&["README.md".to_string()]).await;
        assert_eq!(report.severity, ValidationSeverity::Info);
    }

    #[tokio::test]
    async fn node_probe_runs_npm_test_without_build_script() {
        let executor = Arc::new(ManifestExecutor {
            manifests: vec!["package.json"],
            probe_output: CommandOutput {
                stdout: String::new(),
                stderr: "SyntaxError: Unexpected token".to_string(),
                exit_code: 1,
            },
            calls: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(ValidationCache::new(3600, 10, None));
        let validator = BuildValidator::new(executor.clone(), cache);
        let report = validator.validate_files(&[]).await;
        assert_eq!(report.severity, ValidationSeverity::Critical);
        assert!(executor.calls.lock().unwrap().iter().any(|c| c == "npm test"));
    }

    #[tokio::test]
    async fn python_probe_is_gated_on_requirements_txt() {
        let executor = Arc::new(ManifestExecutor {
            manifests: vec!["requirements.txt"],
            probe_output: CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 },
            calls: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(ValidationCache::new(3600, 10, None));
        let validator = BuildValidator::new(executor.clone(), cache);
        let report = validator.validate_files(&["app.py".to_string()]).await;
        assert_eq!(report.severity, ValidationSeverity::Info);
        assert!(executor
            .calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.contains("py_compile") && c.contains("app.py")));
    }

    #[tokio::test]
    async fn cache_hit_is_prefixed_with_cached_marker() {
        let executor = Arc::new(ManifestExecutor {
            manifests: vec!["Makefile"],
            probe_output: CommandOutput { stdout: "ok".to_string(), stderr: String::new(), exit_code: 0 },
            calls: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(ValidationCache::new(3600, 10, None));
        let validator = BuildValidator::new(executor, cache);
        validator.validate_files(&[]).await;
        let second = validator.validate_files(&[]).await;
        assert!(second.message.starts_with("[CACHED]"));
    }

    #[tokio::test]
    async fn worst_severity_wins_across_probes() {
        let executor = Arc::new(ManifestExecutor {
            manifests: vec!["package.json", "Makefile"],
            probe_output: CommandOutput {
                stdout: String::new(),
                stderr: "undefined reference to `foo`".to_string(),
                exit_code: 2,
            },
            calls: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(ValidationCache::new(3600, 10, None));
        let validator = BuildValidator::new(executor, cache);
        let report = validator.validate_files(&[]).await;
        assert_eq!(report.severity, ValidationSeverity::Critical);
    }
}
