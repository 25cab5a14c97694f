/// Process Supervisor - Sandboxed Child Execution
///
/// **Core Responsibility:**
/// Launch one child process with redirected stdio, enforce wall-clock and
/// resident-memory limits, and report what was observed.
///
/// **Critical Architectural Boundary:**
/// - The supervisor knows HOW to run and kill a process
/// - It does NOT know languages, verdicts, or output comparison
/// - It returns a raw `ProcessOutcome` for the evaluator to judge
///
/// **Two watchdogs run concurrently for the lifetime of the child:**
/// - memory poller: samples the RSS of the whole process subtree and kills
///   the process group when the cap is breached
/// - deadline: bounded wait on child exit, kills the group on expiry
///
/// Cause attribution is race-free: each watchdog sets its flag before it
/// sends SIGKILL, and the flags are read in precedence order (memory wins)
/// only after the child has been reaped.
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use sysinfo::System;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Child was killed by the deadline watchdog (or the `timeout` wrapper).
pub const EXIT_KILLED_BY_DEADLINE: i32 = -1;
/// Child was killed by the memory watchdog.
pub const EXIT_KILLED_BY_MEMORY: i32 = -2;
/// The supervisor could not obtain an exit code (spawn failed, wait failed).
pub const EXIT_NO_CODE: i32 = -999;

/// Exit codes the `timeout(1)` wrapper reports for an expired command.
const TIMEOUT_WRAPPER_EXITS: [i32; 2] = [124, 137];

const MEMORY_WARMUP: Duration = Duration::from_millis(100);
const MEMORY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Everything observable about one supervised run.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub memory_exceeded: bool,
}

impl ProcessOutcome {
    fn spawn_failure() -> Self {
        ProcessOutcome {
            exit_code: EXIT_NO_CODE,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            timed_out: false,
            memory_exceeded: false,
        }
    }
}

/// Run `command args...` in `working_dir` and supervise it to completion.
///
/// `stdin_bytes = None` gives the child an immediate EOF on stdin. The
/// payload, when present, is written from memory on a concurrent task so a
/// slow reader can never deadlock output draining.
///
/// The child is confirmed reaped before this function returns, and both
/// streams are drained fully. Limits are taken as given; callers clamp
/// per-case limits against the global ceilings first.
pub async fn run(
    command: &str,
    args: &[String],
    working_dir: &Path,
    stdin_bytes: Option<&[u8]>,
    time_limit_sec: u64,
    max_memory_mb: u64,
) -> ProcessOutcome {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.stdin(if stdin_bytes.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    // Own process group, so SIGKILL reaches every descendant.
    cmd.process_group(0);

    let started = Instant::now();

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(command, error = %e, "failed to spawn child");
            return ProcessOutcome::spawn_failure();
        }
    };
    let pid = child.id();

    let stdin_task = stdin_bytes.map(|payload| {
        let pipe = child.stdin.take();
        let payload = payload.to_vec();
        tokio::spawn(async move {
            if let Some(mut pipe) = pipe {
                if let Err(e) = pipe.write_all(&payload).await {
                    // Child exited or was killed before consuming stdin.
                    debug!(error = %e, "stdin feed interrupted");
                }
            }
        })
    });

    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    let memory_flag = Arc::new(AtomicBool::new(false));
    let memory_watchdog = pid.map(|pid| {
        let flag = Arc::clone(&memory_flag);
        let limit_bytes = max_memory_mb.saturating_mul(1024 * 1024);
        tokio::spawn(async move {
            tokio::time::sleep(MEMORY_WARMUP).await;
            let mut system = System::new();
            loop {
                system.refresh_processes();
                let rss = process_tree_rss(&system, pid);
                if rss == 0 {
                    // Subtree is gone; nothing left to police.
                    break;
                }
                if rss > limit_bytes {
                    // Flag first, then kill: the post-exit classification
                    // must see the cause even if the child also hits the
                    // deadline in the same instant.
                    flag.store(true, Ordering::SeqCst);
                    warn!(pid, rss, limit_bytes, "memory cap breached, killing process group");
                    kill_process_group(pid);
                    break;
                }
                tokio::time::sleep(MEMORY_POLL_INTERVAL).await;
            }
        })
    });

    let mut deadline_fired = false;
    let deadline = Duration::from_secs(time_limit_sec);
    let status = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            warn!(error = %e, "wait on child failed");
            None
        }
        Err(_) => {
            if !memory_flag.load(Ordering::SeqCst) {
                deadline_fired = true;
            }
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            // A killed child cannot block wait indefinitely; reap it.
            match child.wait().await {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(error = %e, "wait after kill failed");
                    None
                }
            }
        }
    };

    if let Some(watchdog) = memory_watchdog {
        watchdog.abort();
        let _ = watchdog.await;
    }
    if let Some(task) = stdin_task {
        let _ = task.await;
    }
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let duration_ms = started.elapsed().as_millis() as u64;
    let memory_exceeded = memory_flag.load(Ordering::SeqCst);

    // Attribution precedence: memory, then deadline, then the child's own
    // exit status. The child may exit naturally between flag-set and kill,
    // so the flags decide, never the exit code alone.
    let (exit_code, timed_out) = if memory_exceeded {
        (EXIT_KILLED_BY_MEMORY, false)
    } else if deadline_fired {
        (EXIT_KILLED_BY_DEADLINE, true)
    } else if let Some(status) = status {
        let code = exit_code_of(status);
        if is_timeout_wrapper(command) && TIMEOUT_WRAPPER_EXITS.contains(&code) {
            (EXIT_KILLED_BY_DEADLINE, true)
        } else {
            (code, false)
        }
    } else {
        (EXIT_NO_CODE, false)
    };

    debug_assert!(
        !(timed_out && memory_exceeded),
        "timed_out and memory_exceeded must never both be set"
    );

    ProcessOutcome {
        exit_code,
        stdout,
        stderr,
        duration_ms,
        timed_out,
        memory_exceeded,
    }
}

/// Read a stream to EOF, then normalise CRLF line endings.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "stream drain interrupted");
        }
    }
    String::from_utf8_lossy(&buf).replace("\r\n", "\n")
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        // Killed by a signal outside the watchdogs (e.g. SIGSEGV): surface
        // the conventional 128+signal code so it classifies as a runtime
        // error downstream.
        None => status.signal().map(|sig| 128 + sig).unwrap_or(EXIT_NO_CODE),
    }
}

fn is_timeout_wrapper(command: &str) -> bool {
    Path::new(command)
        .file_name()
        .map(|name| name == "timeout")
        .unwrap_or(false)
}

fn kill_process_group(pid: u32) {
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        // Group may already be gone; never propagate kill failures.
        warn!(pid, error = %e, "failed to kill process group");
    }
}

/// Sum the resident set size of `root` and every live descendant.
///
/// The run command is wrapped under `timeout(1)`, so the process doing the
/// real allocation is a grandchild; sampling only the direct child would
/// miss it.
fn process_tree_rss(system: &System, root: u32) -> u64 {
    let root = sysinfo::Pid::from_u32(root);
    let mut total = 0u64;
    for (pid, process) in system.processes() {
        let mut cursor = Some(*pid);
        while let Some(current) = cursor {
            if current == root {
                total += process.memory();
                break;
            }
            cursor = system.process(current).and_then(|p| p.parent());
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workdir() -> tempfile::TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_zero() {
        let dir = workdir();
        let outcome = run("sh", &sh("printf 'hi\\n'"), dir.path(), None, 5, 256).await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "hi\n");
        assert!(!outcome.timed_out);
        assert!(!outcome.memory_exceeded);
    }

    #[tokio::test]
    async fn feeds_stdin_from_memory() {
        let dir = workdir();
        let payload: &[u8] = b"alpha\nbeta\n";
        let outcome = run("sh", &sh("cat"), dir.path(), Some(payload), 5, 256).await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn no_stdin_payload_means_immediate_eof() {
        let dir = workdir();
        // cat terminates only on EOF; without a payload it must not hang.
        let outcome = run("sh", &sh("cat"), dir.path(), None, 5, 256).await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "");
    }

    #[tokio::test]
    async fn reports_nonzero_exit_code() {
        let dir = workdir();
        let outcome = run("sh", &sh("exit 3"), dir.path(), None, 5, 256).await;
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn normalises_crlf_on_read() {
        let dir = workdir();
        let outcome = run("sh", &sh("printf 'a\\r\\nb'"), dir.path(), None, 5, 256).await;
        assert_eq!(outcome.stdout, "a\nb");
    }

    #[tokio::test]
    async fn deadline_kills_and_attributes() {
        let dir = workdir();
        let outcome = run("sh", &sh("sleep 5"), dir.path(), None, 1, 256).await;
        assert!(outcome.timed_out);
        assert!(!outcome.memory_exceeded);
        assert_eq!(outcome.exit_code, EXIT_KILLED_BY_DEADLINE);
        assert!(outcome.duration_ms >= 1000);
        assert!(outcome.duration_ms < 3000, "kill took {}ms", outcome.duration_ms);
    }

    #[tokio::test]
    async fn memory_watchdog_kills_and_attributes() {
        let dir = workdir();
        // A zero cap trips on the first sample: any live subtree has RSS.
        let outcome = run("sh", &sh("sleep 5"), dir.path(), None, 10, 0).await;
        assert!(outcome.memory_exceeded);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, EXIT_KILLED_BY_MEMORY);
        assert!(outcome.duration_ms < 5000);
    }

    #[tokio::test]
    async fn spawn_failure_is_sentinel() {
        let dir = workdir();
        let outcome = run("/nonexistent/arbiter-test-cmd", &[], dir.path(), None, 5, 256).await;
        assert_eq!(outcome.exit_code, EXIT_NO_CODE);
        assert_eq!(outcome.duration_ms, 0);
        assert!(!outcome.timed_out);
        assert!(!outcome.memory_exceeded);
    }

    #[tokio::test]
    async fn timeout_wrapper_exit_reclassifies_as_deadline() {
        let dir = workdir();
        let args: Vec<String> = ["--signal=SIGKILL", "1s", "sleep", "5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // Inner wrapper fires at 1s, well before our own 5s deadline.
        let outcome = run("timeout", &args, dir.path(), None, 5, 256).await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, EXIT_KILLED_BY_DEADLINE);
    }
}
