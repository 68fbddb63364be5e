//! Type-Safe Tool Execution
//!
//! All `kubectl` and `helm` invocations go through a `ToolRunner`. The
//! production runner, `SystemToolRunner`, delegates to `run_tool_safe`, which:
//!
//! - spawns the tool in its own process group
//! - registers the PID with `ChildRegistry::global()` for signal cleanup
//! - drains stdout/stderr on helper threads so full pipes cannot stall the child
//! - kills the process group when the invocation's timeout expires

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::process_guard::{kill_group, ChildRegistry, CommandProcessGroup};
use crate::tool_args::ToolArgs;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Executes typed tool invocations.
pub trait ToolRunner {
    fn run(&mut self, args: &dyn ToolArgs) -> Result<ToolOutput>;
}

/// Runs tools as real subprocesses.
#[derive(Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&mut self, args: &dyn ToolArgs) -> Result<ToolOutput> {
        run_tool_safe(args)
    }
}

/// Execute a tool with type-safe arguments and a bounded wait.
///
/// # Returns
///
/// - `Ok(output)` - the tool ran to completion or was killed on timeout
///   (`timed_out` set); a non-zero exit is reported through `success`
/// - `Err` - the tool could not be spawned or waited on
pub fn run_tool_safe(args: &dyn ToolArgs) -> Result<ToolOutput> {
    let program = args.program();
    let cli_args = args.to_cli_args();
    let timeout = args.timeout();

    info!("run_tool_safe: {} args={:?} timeout={:?}", program, cli_args, timeout);

    let mut child = Command::new(program)
        .args(&cli_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group()
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;
    let pid = child.id();

    register(pid);
    // Drain before waiting; a chatty child would otherwise block on a full pipe
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let result = wait_bounded(&mut child, timeout);
    unregister(pid);

    let (status, timed_out) = result.with_context(|| format!("Failed waiting for {}", program))?;
    let stdout = collect(stdout);
    let stderr = collect(stderr);

    let output = ToolOutput {
        stdout,
        stderr,
        exit_code: status.and_then(|s| s.code()),
        success: status.is_some_and(|s| s.success()) && !timed_out,
        timed_out,
    };
    if output.success {
        info!("{} completed successfully", program);
    } else {
        info!("{} failed with exit code {:?}", program, output.exit_code);
    }
    Ok(output)
}

fn register(pid: u32) {
    ChildRegistry::lock_global().register(pid);
}

fn unregister(pid: u32) {
    ChildRegistry::lock_global().unregister(pid);
}

type Drain = JoinHandle<String>;

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Drain {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<Drain>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Poll the child until it exits or `timeout` elapses.
///
/// Returns the exit status (None if killed) and whether the timeout fired.
fn wait_bounded(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<(Option<ExitStatus>, bool)> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if start.elapsed() >= timeout {
            warn!("PID {} exceeded {:?}, killing process group", child.id(), timeout);
            kill_group(child.id());
            let _ = child.wait();
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal or timeout).
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
}

impl ToolOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            success: true,
            ..Self::default()
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// The most useful text to show the operator when a tool fails.
    pub fn failure_detail(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let code = self
            .exit_code
            .map(|c| format!("exit code {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if text.is_empty() {
            code
        } else {
            format!("{}: {}", code, text)
        }
    }
}
