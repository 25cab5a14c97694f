/// Language Adapter - Per-Language Compile/Run Pipeline
///
/// One worker instance serves exactly one language. The adapter knows the
/// language-specific constants (source file name, compile invocation and
/// budget, run invocation) and drives the supervisor; it does not decide
/// verdicts beyond delegating to the shared classification.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arbiter_common::types::{Language, TestCaseResult, TestCaseSpec};
use tokio::fs;
use tracing::debug;

use crate::config::GlobalLimits;
use crate::evaluator::classify;
use crate::supervisor::{self, EXIT_NO_CODE};

/// Extra resident headroom granted to the JVM on top of `-Xmx`, so the
/// poller does not kill a heap that is still within its configured cap.
const JAVA_WATCHDOG_HEADROOM_MB: u64 = 64;

/// Grace added to the supervisor deadline so the inner `timeout(1)` wrapper
/// fires first when both are tripped.
const SUPERVISOR_GRACE_SEC: u64 = 2;

/// Result of the once-per-batch compile step.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub ok: bool,
    /// What to execute per test case: the artifact path for compiled
    /// languages, the script path for python, the class name for java.
    pub run_identifier: Option<String>,
    /// Concatenated compiler stdout and stderr.
    pub compiler_output: String,
    pub artifact_path: Option<PathBuf>,
}

pub struct LanguageAdapter {
    language: Language,
    limits: GlobalLimits,
}

impl LanguageAdapter {
    pub fn new(language: Language, limits: GlobalLimits) -> Self {
        LanguageAdapter { language, limits }
    }

    pub fn source_file_name(&self) -> &'static str {
        match self.language {
            Language::C => "solution.c",
            Language::Python => "solution.py",
            Language::Java => "Solution.java",
            Language::Rust => "main.rs",
            Language::Go => "main.go",
        }
    }

    fn artifact_file_name(&self) -> Option<&'static str> {
        match self.language {
            Language::C => Some("solution"),
            Language::Rust | Language::Go => Some("solution_exec"),
            Language::Java => Some("Solution.class"),
            Language::Python => None,
        }
    }

    /// Compile command and its budget (seconds, MB), run with the work dir
    /// as cwd.
    fn compile_invocation(&self) -> (&'static str, Vec<String>, u64, u64) {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match self.language {
            Language::C => (
                "gcc",
                args(&["solution.c", "-o", "solution", "-O2", "-Wall", "-lm"]),
                30,
                4096,
            ),
            // Syntax check only; the interpreter runs the script directly.
            Language::Python => ("python3", args(&["-m", "py_compile", "solution.py"]), 10, 128),
            Language::Java => (
                "javac",
                args(&["-encoding", "UTF-8", "-d", ".", "Solution.java"]),
                30,
                2048,
            ),
            Language::Rust => ("rustc", args(&["main.rs", "-o", "solution_exec"]), 30, 256),
            Language::Go => ("go", args(&["build", "-o", "solution_exec", "main.go"]), 30, 256),
        }
    }

    /// Write the submitted source into the work dir, stripping the UTF-8
    /// BOM where the toolchain chokes on it (javac, rustc, go). Java
    /// sources additionally lose stray zero bytes and are written as plain
    /// UTF-8; `-encoding UTF-8` handles the rest.
    pub async fn write_source(&self, code: &str, work_dir: &Path) -> Result<PathBuf> {
        let cleaned: String = match self.language {
            Language::Java => code
                .trim_start_matches('\u{feff}')
                .chars()
                .filter(|c| *c != '\0')
                .collect(),
            Language::Rust | Language::Go => code.trim_start_matches('\u{feff}').to_string(),
            Language::C | Language::Python => code.to_string(),
        };

        let path = work_dir.join(self.source_file_name());
        fs::write(&path, cleaned)
            .await
            .with_context(|| format!("failed to write source file {}", path.display()))?;
        Ok(path)
    }

    /// Compile (or syntax-check) once per batch.
    ///
    /// A compiler that cannot be invoked at all is an internal fault and
    /// surfaces as `Err`; a compiler that runs and rejects the source is a
    /// regular failed `CompileOutcome`.
    pub async fn compile(&self, work_dir: &Path) -> Result<CompileOutcome> {
        let (program, args, budget_sec, budget_mb) = self.compile_invocation();
        debug!(language = %self.language, program, "compiling batch source");

        let outcome = supervisor::run(program, &args, work_dir, None, budget_sec, budget_mb).await;
        if outcome.exit_code == EXIT_NO_CODE {
            bail!("failed to invoke {program} for {}", self.language);
        }

        let compiler_output = concat_streams(&outcome.stdout, &outcome.stderr);

        let artifact_path = self.artifact_file_name().map(|name| work_dir.join(name));
        let ok = match self.language {
            // Exit status alone decides; javac drops class files in cwd.
            Language::Python | Language::Java => outcome.exit_code == 0,
            // Compiled languages must actually have produced the artifact.
            Language::C | Language::Rust | Language::Go => {
                outcome.exit_code == 0
                    && match &artifact_path {
                        Some(path) => fs::try_exists(path).await.unwrap_or(false),
                        None => false,
                    }
            }
        };

        let run_identifier = if ok {
            Some(match self.language {
                Language::C => work_dir.join("solution").to_string_lossy().into_owned(),
                Language::Rust | Language::Go => {
                    work_dir.join("solution_exec").to_string_lossy().into_owned()
                }
                Language::Python => work_dir.join("solution.py").to_string_lossy().into_owned(),
                Language::Java => "Solution".to_string(),
            })
        } else {
            None
        };

        Ok(CompileOutcome {
            ok,
            run_identifier,
            compiler_output,
            artifact_path,
        })
    }

    /// Run the compiled artifact against one test case and classify it.
    ///
    /// The command is wrapped under `timeout --signal=SIGKILL` so the OS
    /// enforces the wall clock even if the supervisor's own deadline were
    /// to misbehave; the supervisor deadline sits two seconds behind it.
    pub async fn run_one(
        &self,
        work_dir: &Path,
        run_identifier: &str,
        spec: &TestCaseSpec,
    ) -> TestCaseResult {
        let time_limit_ms = spec.time_limit_ms.min(self.limits.max_time_sec * 1000);
        let ram_mb = spec.max_ram_mb.min(self.limits.max_memory_mb);
        let wrapper_sec = (time_limit_ms / 1000).max(1);

        let (args, watchdog_mb) = self.run_invocation(work_dir, run_identifier, wrapper_sec, ram_mb);

        let outcome = supervisor::run(
            "timeout",
            &args,
            work_dir,
            Some(spec.stdin.as_bytes()),
            wrapper_sec + SUPERVISOR_GRACE_SEC,
            watchdog_mb,
        )
        .await;

        let stdout = outcome.stdout.trim_end_matches(&['\r', '\n'][..]).to_string();
        let stderr = outcome.stderr.trim_end_matches(&['\r', '\n'][..]).to_string();
        let status = classify(self.language, &outcome, &stdout, &spec.expected_stdout);

        TestCaseResult {
            test_case_id: spec.test_case_id.clone(),
            status,
            stdout,
            stderr,
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration_ms,
            memory_exceeded: outcome.memory_exceeded,
            message: None,
        }
    }

    /// Argv for `timeout --signal=SIGKILL <N>s <cmd...>`, plus the memory
    /// cap handed to the supervisor's poller.
    fn run_invocation(
        &self,
        work_dir: &Path,
        run_identifier: &str,
        wrapper_sec: u64,
        ram_mb: u64,
    ) -> (Vec<String>, u64) {
        let mut args = vec!["--signal=SIGKILL".to_string(), format!("{wrapper_sec}s")];
        let watchdog_mb = match self.language {
            Language::C | Language::Rust | Language::Go => {
                args.push(run_identifier.to_string());
                ram_mb
            }
            Language::Python => {
                args.push("python3".to_string());
                args.push(run_identifier.to_string());
                ram_mb
            }
            Language::Java => {
                args.push("java".to_string());
                args.push(format!("-Xmx{ram_mb}m"));
                args.push("-cp".to_string());
                args.push(work_dir.to_string_lossy().into_owned());
                args.push(run_identifier.to_string());
                ram_mb + JAVA_WATCHDOG_HEADROOM_MB
            }
        };
        (args, watchdog_mb)
    }
}

fn concat_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, _) => stderr.to_string(),
        (_, true) => stdout.to_string(),
        _ => format!("{stdout}\n{stderr}"),
    }
}
