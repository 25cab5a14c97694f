/// Batch Evaluator - Compile Once, Run Per Case, Classify
///
/// **Core Responsibility:**
/// Orchestrate one batch: stage the source in a fresh sandbox directory,
/// compile once, run every test case in order, and map each observed
/// process outcome onto the verdict taxonomy.
///
/// **Critical Properties:**
/// - Knows nothing about HTTP, blobs, or the orchestrator
/// - Verdict classification lives here and only here
/// - Results are aligned 1:1 and in order with the input specs
/// - The sandbox subdirectory is deleted on every exit path
use std::path::{Path, PathBuf};

use arbiter_common::types::{BatchJob, BatchResult, Language, Verdict};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GlobalLimits;
use crate::languages::LanguageAdapter;
use crate::output::outputs_match;
use crate::supervisor::ProcessOutcome;

/// Exit codes `timeout(1)` uses for an expired command; treated as a time
/// limit even when the flags missed it.
const TIMEOUT_EXIT_CODES: [i32; 2] = [124, 137];

/// Stderr marker of a JVM that died of heap exhaustion under its `-Xmx`
/// cap, which the resident-set poller cannot always observe in time.
const JAVA_OOM_MARKER: &str = "java.lang.OutOfMemoryError";

/// Map one process outcome onto a verdict.
///
/// Precedence is fixed: memory, then time, then runtime failure, then the
/// output comparison. `stdout` is the already-trimmed capture.
pub fn classify(
    language: Language,
    outcome: &ProcessOutcome,
    stdout: &str,
    expected_stdout: &str,
) -> Verdict {
    if outcome.memory_exceeded {
        return Verdict::MemoryLimitExceeded;
    }
    if language == Language::Java && outcome.stderr.contains(JAVA_OOM_MARKER) {
        return Verdict::MemoryLimitExceeded;
    }
    if outcome.timed_out || TIMEOUT_EXIT_CODES.contains(&outcome.exit_code) {
        return Verdict::TimeLimitExceeded;
    }
    if outcome.exit_code != 0 {
        return Verdict::RuntimeError;
    }
    if outputs_match(stdout, expected_stdout) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

/// Evaluate one batch to completion. Infallible by design: every failure
/// mode becomes a verdict in the returned result.
pub async fn evaluate_batch(
    job: &BatchJob,
    limits: GlobalLimits,
    sandbox_root: &Path,
) -> BatchResult {
    let adapter = LanguageAdapter::new(job.language, limits);

    // Unique subdirectory per batch: concurrent batches must never share
    // file names inside the sandbox root.
    let batch_dir = sandbox_root.join(format!("batch-{}", Uuid::new_v4()));
    if let Err(e) = fs::create_dir_all(&batch_dir).await {
        warn!(error = %e, dir = %batch_dir.display(), "failed to create batch sandbox");
        return BatchResult::fabricated(
            job.submission_id,
            &job.test_cases,
            Verdict::InternalError,
            &format!("setup failed: {e}"),
            "setup failed",
        );
    }

    let result = evaluate_in_dir(job, &adapter, &batch_dir).await;
    cleanup(&batch_dir).await;
    result
}

async fn evaluate_in_dir(
    job: &BatchJob,
    adapter: &LanguageAdapter,
    batch_dir: &PathBuf,
) -> BatchResult {
    info!(
        submission_id = job.submission_id,
        language = %job.language,
        test_count = job.test_cases.len(),
        "starting batch evaluation"
    );

    if let Err(e) = adapter.write_source(&job.source_code, batch_dir).await {
        warn!(submission_id = job.submission_id, error = %e, "source write failed");
        return BatchResult::fabricated(
            job.submission_id,
            &job.test_cases,
            Verdict::InternalError,
            &format!("setup failed: {e}"),
            "setup failed",
        );
    }

    let compiled = match adapter.compile(batch_dir).await {
        Ok(compiled) => compiled,
        Err(e) => {
            warn!(submission_id = job.submission_id, error = %e, "compiler invocation failed");
            return BatchResult::fabricated(
                job.submission_id,
                &job.test_cases,
                Verdict::InternalError,
                &format!("{e}"),
                "compiler could not be invoked",
            );
        }
    };

    if compiled.ok {
        debug!(
            submission_id = job.submission_id,
            artifact = ?compiled.artifact_path,
            "compilation succeeded"
        );
    } else {
        info!(submission_id = job.submission_id, "compilation failed");
        return BatchResult::fabricated(
            job.submission_id,
            &job.test_cases,
            Verdict::CompileError,
            &compiled.compiler_output,
            "compilation failed",
        );
    }

    let run_identifier = match compiled.run_identifier.as_deref() {
        Some(id) => id,
        // Unreachable when `ok` holds, but never panic on a batch.
        None => {
            return BatchResult::fabricated(
                job.submission_id,
                &job.test_cases,
                Verdict::InternalError,
                "compile step produced no run identifier",
                "setup failed",
            );
        }
    };

    // Sequential, in input order; the artifact is read-only from here on.
    let mut results = Vec::with_capacity(job.test_cases.len());
    for (idx, spec) in job.test_cases.iter().enumerate() {
        let spec = spec.clone().clamped();
        let result = adapter.run_one(batch_dir, run_identifier, &spec).await;
        debug!(
            submission_id = job.submission_id,
            test_num = idx + 1,
            test_case_id = spec.test_case_id.as_deref().unwrap_or(""),
            status = ?result.status,
            duration_ms = result.duration_ms,
            exit_code = result.exit_code,
            "test case finished"
        );
        results.push(result);
    }

    debug_assert_eq!(results.len(), job.test_cases.len());

    info!(
        submission_id = job.submission_id,
        accepted = results.iter().filter(|r| r.status == Verdict::Accepted).count(),
        total = results.len(),
        "batch evaluation complete"
    );

    BatchResult {
        submission_id: job.submission_id,
        compilation_success: true,
        compiler_output: compiled.compiler_output,
        test_case_results: results,
    }
}

/// Best-effort removal of the batch directory; failures are logged and
/// swallowed so cleanup can never mask an evaluation result.
async fn cleanup(batch_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(batch_dir).await {
        warn!(dir = %batch_dir.display(), error = %e, "failed to remove batch sandbox");
    }
}
