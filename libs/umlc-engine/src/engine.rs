//! Process Engine - Spawning and Supervising External Toolchains
//!
//! **Core Responsibility:**
//! Run one external program with a bounded wait and hand back what it wrote.
//!
//! **Architectural Boundary:**
//! - Engine knows HOW to spawn, wait, kill and capture
//! - Engine does NOT know about languages, phases or temp files
//! - Engine does NOT classify compile vs. runtime failures (orchestrator's job)
//!
//! **Process Rules:**
//! 1. Bare program names are resolved on PATH before anything is spawned
//! 2. Each child leads its own process group (unix) so the whole tree can be killed
//! 3. stdout and stderr are drained concurrently; bytes past the limit are dropped
//! 4. Timeout and cancellation kill the process group and keep partial output
//! 5. The group is also killed after a normal exit to reap stragglers
//! 6. A drop guard kills the group if the run future is abandoned

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{ExecResult, ExecutionError};

/// How long stream readers may keep draining once the process is gone
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);
const READ_CHUNK_BYTES: usize = 4096;

/// One program invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Written to the child's stdin, then stdin is closed. `None` gives EOF.
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            stdin: None,
            timeout,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    #[default]
    Exited,
    TimedOut,
    Cancelled,
}

/// Raw captured output of one process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub elapsed_ms: u64,
    pub termination: Termination,
    /// At least one stream hit the byte limit
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == Some(0)
    }
}

/// Kills a child's process group unless already done.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid = pgid, error = %e, "Failed to kill process group"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = pgid;
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Captured>>;

/// Runs external programs for the orchestrator and the prober.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    output_limit: usize,
    drain_grace: Duration,
}

impl ProcessEngine {
    pub fn new(output_limit: usize) -> Self {
        Self {
            output_limit,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Locate `program` without spawning it.
    ///
    /// Anything containing a path separator is checked as a path; bare names
    /// are searched on PATH.
    pub fn resolve_program(program: &str) -> ExecResult<PathBuf> {
        let missing = || ExecutionError::ToolMissing {
            tool: program.to_string(),
        };
        let path = Path::new(program);
        if path.components().count() > 1 || path.is_absolute() {
            return if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(missing())
            };
        }
        which::which(program).map_err(|_| missing())
    }

    /// Spawn `spec` and wait for it to exit, time out, or be cancelled.
    ///
    /// Timeout and cancellation are not errors here; they are reported via
    /// [`ProcessOutput::termination`] so partial output is preserved.
    pub async fn run(&self, spec: &ProcessSpec, cancel: &CancelToken) -> ExecResult<ProcessOutput> {
        let program = Self::resolve_program(&spec.program)?;

        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        command.process_group(0);

        if cancel.is_cancelled() {
            return Ok(ProcessOutput {
                termination: Termination::Cancelled,
                ..Default::default()
            });
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExecutionError::ToolMissing {
                tool: spec.program.clone(),
            },
            _ => ExecutionError::io(format!("Failed to spawn '{}'", spec.program), e),
        })?;
        let mut guard = ProcessGroupGuard::new(child.id());

        debug!(
            program = %program.display(),
            args = ?spec.args,
            pid = ?child.id(),
            timeout_ms = spec.timeout.as_millis() as u64,
            "Spawned process"
        );

        if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                // The child may exit without reading; a broken pipe is fine.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "stdin write stopped early");
                }
                let _ = stdin.shutdown().await;
            });
        }

        let stdout_capture = SharedCapture::default();
        let stderr_capture = SharedCapture::default();
        let stdout_task = spawn_reader(child.stdout.take(), stdout_capture.clone(), self.output_limit);
        let stderr_task = spawn_reader(child.stderr.take(), stderr_capture.clone(), self.output_limit);

        let (termination, wait_result) = tokio::select! {
            result = child.wait() => (Termination::Exited, Some(result)),
            _ = tokio::time::sleep(spec.timeout) => (Termination::TimedOut, None),
            _ = cancel.cancelled() => (Termination::Cancelled, None),
        };

        // Always take the whole group down: on timeout/cancel this stops the
        // program, after a normal exit it reaps anything left in the background.
        guard.kill();

        let status = match wait_result {
            Some(result) => {
                Some(result.map_err(|e| ExecutionError::io("Failed to wait for process", e))?)
            }
            None => {
                if termination == Termination::TimedOut {
                    warn!(
                        program = %spec.program,
                        timeout_ms = spec.timeout.as_millis() as u64,
                        "Process timed out - killed"
                    );
                } else {
                    debug!(program = %spec.program, "Process cancelled - killed");
                }
                let _ = child.start_kill();
                child.wait().await.ok()
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        finish_reader(stdout_task, self.drain_grace).await;
        finish_reader(stderr_task, self.drain_grace).await;
        let (stdout, stdout_truncated) = take_capture(&stdout_capture);
        let (stderr, stderr_truncated) = take_capture(&stderr_capture);

        let exit_code = status.and_then(|s| s.code());
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.and_then(|s| s.signal())
        };
        #[cfg(not(unix))]
        let signal = None;

        debug!(
            program = %spec.program,
            exit_code = ?exit_code,
            signal = ?signal,
            termination = ?termination,
            elapsed_ms = elapsed_ms,
            "Process finished"
        );

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
            signal,
            elapsed_ms,
            termination,
            truncated: stdout_truncated || stderr_truncated,
        })
    }
}

fn spawn_reader<R>(stream: Option<R>, capture: SharedCapture, limit: usize) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut stream = stream?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let Ok(mut captured) = capture.lock() else {
                        break;
                    };
                    let room = limit.saturating_sub(captured.bytes.len());
                    if n > room {
                        captured.truncated = true;
                    }
                    let keep = n.min(room);
                    captured.bytes.extend_from_slice(&chunk[..keep]);
                }
                Err(e) => {
                    debug!(error = %e, "Stream read ended with error");
                    break;
                }
            }
        }
    }))
}

async fn finish_reader(task: Option<JoinHandle<()>>, grace: Duration) {
    let Some(mut task) = task else {
        return;
    };
    if tokio::time::timeout(grace, &mut task).await.is_err() {
        // Something outside the killed group still holds the pipe open.
        task.abort();
    }
}

fn take_capture(capture: &SharedCapture) -> (String, bool) {
    match capture.lock() {
        Ok(mut captured) => {
            let bytes = std::mem::take(&mut captured.bytes);
            (String::from_utf8_lossy(&bytes).into_owned(), captured.truncated)
        }
        Err(_) => (String::new(), false),
    }
}
