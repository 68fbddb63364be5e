//! Operator interaction.
//!
//! All prompts go through the `Prompter` trait. The production implementation
//! talks to the controlling terminal (`/dev/tty`) directly, so the installer
//! still works when standard input is a pipe (e.g. `curl ... | k8smon`).
//! Non-interactive runs use `HeadlessPrompter`, which refuses to ask anything.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::fd::AsFd;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{InstallerError, Result};

const TTY_PATH: &str = "/dev/tty";

/// How long a prompt waits for the operator before the run is abandoned.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Terminal attributes saved while echo is disabled, so a signal handler
/// can put the terminal back before exiting.
static SAVED_TERMIOS: Mutex<Option<Termios>> = Mutex::new(None);

/// Source of operator input and sink for operator-facing messages.
pub trait Prompter {
    /// Show `prompt` and read one line, without the trailing newline.
    fn read_line(&mut self, prompt: &str) -> Result<String>;

    /// Show `prompt` and read one line without echoing it.
    fn read_secret(&mut self, prompt: &str) -> Result<String>;

    /// Print a line for the operator.
    fn message(&mut self, text: &str) -> Result<()>;
}

/// Ask a yes/no question until a recognizable answer is given.
///
/// An empty answer selects `default`.
pub fn confirm(prompter: &mut dyn Prompter, question: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        let answer = prompter.read_line(&format!("{question} {hint} "))?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => prompter.message("Please answer 'y' or 'n'.")?,
        }
    }
}

/// Prompter bound to the controlling terminal.
pub struct TtyPrompter {
    reader: BufReader<File>,
    writer: File,
    timeout: Duration,
}

impl TtyPrompter {
    /// Open the controlling terminal for reading and writing.
    pub fn open() -> Result<Self> {
        Self::open_path(Path::new(TTY_PATH))
    }

    fn open_path(path: &Path) -> Result<Self> {
        let tty = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                InstallerError::terminal(format!(
                    "cannot open {} for interactive input ({e}); use --non-interactive",
                    path.display()
                ))
            })?;
        let writer = tty.try_clone()?;
        Ok(Self {
            reader: BufReader::new(tty),
            writer,
            timeout: PROMPT_TIMEOUT,
        })
    }

    /// Give up on a prompt after `timeout` without a complete line.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn show(&mut self, prompt: &str) -> Result<()> {
        self.writer.write_all(prompt.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_raw_line(&mut self) -> Result<String> {
        let buffered = !self.reader.buffer().is_empty();
        if !buffered && !wait_readable(self.reader.get_ref(), self.timeout)? {
            return Err(InstallerError::terminal(format!(
                "no input within {}s",
                self.timeout.as_secs()
            )));
        }
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(InstallerError::terminal("end of input on terminal"));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

impl Prompter for TtyPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        self.show(prompt)?;
        self.read_raw_line()
    }

    fn read_secret(&mut self, prompt: &str) -> Result<String> {
        // echo is off before the prompt appears
        let _echo = EchoGuard::disable(self.writer.try_clone()?)?;
        self.show(prompt)?;
        self.read_raw_line()
    }

    fn message(&mut self, text: &str) -> Result<()> {
        writeln!(self.writer, "{text}")?;
        Ok(())
    }
}

/// Wait until `tty` has input or `timeout` elapses.
fn wait_readable(tty: &File, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let remaining =
            deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()));
        let wait = PollTimeout::try_from(remaining).unwrap_or(PollTimeout::MAX);
        let mut fds = [PollFd::new(tty.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, wait) {
            Ok(0) => return Ok(false),
            // readable, or hung up: read_line reports EOF
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(std::io::Error::from(e).into()),
        }
    }
}

/// Disables terminal echo for its lifetime.
struct EchoGuard {
    tty: File,
    original: Termios,
}

impl EchoGuard {
    fn disable(tty: File) -> Result<Self> {
        let original = termios::tcgetattr(&tty).map_err(std::io::Error::from)?;
        let mut silent = original.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        // keep the newline so the next message starts on a fresh line
        silent.local_flags.insert(LocalFlags::ECHONL);
        termios::tcsetattr(&tty, SetArg::TCSANOW, &silent).map_err(std::io::Error::from)?;

        if let Ok(mut saved) = SAVED_TERMIOS.lock() {
            *saved = Some(original.clone());
        }
        Ok(Self { tty, original })
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(&self.tty, SetArg::TCSANOW, &self.original) {
            tracing::warn!("Failed to restore terminal echo: {}", e);
        }
        if let Ok(mut saved) = SAVED_TERMIOS.lock() {
            *saved = None;
        }
    }
}

/// Re-enable echo if a secret prompt was interrupted.
///
/// Called from the signal handler; does nothing when no prompt is active.
pub fn restore_terminal() {
    let original = match SAVED_TERMIOS.lock() {
        Ok(mut saved) => saved.take(),
        Err(_) => None,
    };
    if let Some(original) = original {
        if let Ok(tty) = OpenOptions::new().read(true).write(true).open(TTY_PATH) {
            let _ = termios::tcsetattr(&tty, SetArg::TCSANOW, &original);
        }
    }
}

/// Prompter for non-interactive runs: messages go to stdout, questions fail.
#[derive(Debug, Default)]
pub struct HeadlessPrompter;

impl Prompter for HeadlessPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        Err(InstallerError::terminal(format!(
            "cannot ask '{}' in non-interactive mode",
            prompt.trim()
        )))
    }

    fn read_secret(&mut self, prompt: &str) -> Result<String> {
        self.read_line(prompt)
    }

    fn message(&mut self, text: &str) -> Result<()> {
        writeln!(std::io::stdout(), "{text}")?;
        Ok(())
    }
}
