//! Process lifecycle management for child processes and signals
//!
//! `kubectl` and `helm` run as leaders of their own process group so an
//! interrupt can take down everything they started. On SIGINT, SIGTERM or
//! SIGHUP the listener thread:
//!
//! 1. restores terminal echo if a secret prompt was active
//! 2. wipes every registered secret file
//! 3. stops tracked process groups (SIGTERM, then SIGKILL after a grace period)
//! 4. exits with `128 + signo`

use nix::libc;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::BTreeSet;
use std::process::Command;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::prompt;
use crate::secret_file::SecretRegistry;

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL on the signal path.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Process groups of running tool invocations.
///
/// Each tool is a group leader, so its PID doubles as the group id.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    groups: BTreeSet<u32>,
    stopping: bool,
}

impl ChildRegistry {
    pub fn global() -> &'static Mutex<ChildRegistry> {
        CHILD_REGISTRY.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    /// Lock the global registry, recovering from poisoning.
    pub fn lock_global() -> MutexGuard<'static, ChildRegistry> {
        match Self::global().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&mut self, pgid: u32) {
        self.groups.insert(pgid);
        debug!("Tracking process group {}", pgid);
    }

    pub fn unregister(&mut self, pgid: u32) {
        if self.groups.remove(&pgid) {
            debug!("Process group {} finished", pgid);
        }
    }

    pub fn count(&self) -> usize {
        self.groups.len()
    }

    /// Ask every tracked group to exit, escalating to SIGKILL for groups
    /// still running after `grace`. Only the first call does anything.
    pub fn stop_all(&mut self, grace: Duration) {
        if std::mem::replace(&mut self.stopping, true) || self.groups.is_empty() {
            return;
        }

        let groups: Vec<u32> = std::mem::take(&mut self.groups).into_iter().collect();
        info!("Stopping {} running tool(s)", groups.len());
        for &pgid in &groups {
            signal_group(pgid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        let mut remaining = groups;
        while Instant::now() < deadline {
            remaining.retain(|&pgid| leader_running(pgid));
            if remaining.is_empty() {
                return;
            }
            thread::sleep(PROBE_INTERVAL);
        }

        for pgid in remaining {
            warn!("Process group {} ignored SIGTERM, killing it", pgid);
            kill_group(pgid);
        }
    }
}

/// Deliver `sig` to a process group; falls back to the leader alone when the
/// group no longer exists.
fn signal_group(pgid: u32, sig: Signal) -> bool {
    let Ok(raw) = i32::try_from(pgid) else {
        return false;
    };
    let pid = Pid::from_raw(raw);
    killpg(pid, sig).is_ok() || nix::sys::signal::kill(pid, sig).is_ok()
}

/// SIGKILL a process group.
pub fn kill_group(pgid: u32) {
    if !signal_group(pgid, Signal::SIGKILL) {
        debug!("Process group {} already gone", pgid);
    }
}

/// Whether the group leader still exists and is not a zombie.
fn leader_running(pgid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pgid)) else {
        return false;
    };
    // State follows the parenthesised command name, which may contain spaces
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .is_some_and(|state| !matches!(state, "Z" | "X"))
}

/// Release everything the process holds before an abnormal exit.
pub fn emergency_cleanup(grace: Duration) {
    prompt::restore_terminal();

    match SecretRegistry::global().lock() {
        Ok(mut secrets) => secrets.wipe_all(),
        Err(poisoned) => poisoned.into_inner().wipe_all(),
    }

    ChildRegistry::lock_global().stop_all(grace);
}

/// Exit status for a run ended by signal `signo`.
pub const fn interrupted_exit_code(signo: i32) -> i32 {
    128 + signo
}

/// Start the signal listener thread. Call once, before anything is written.
pub fn install_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || {
            let Some(signo) = signals.forever().next() else {
                return;
            };
            let name = Signal::try_from(signo).map(Signal::as_str).unwrap_or("signal");
            warn!("Received {}, removing values file and stopping helm", name);

            emergency_cleanup(SHUTDOWN_GRACE);
            std::process::exit(interrupted_exit_code(signo));
        })?;

    Ok(())
}

/// Run a `Command` as the leader of a new process group.
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        self.process_group(0);
        // SAFETY: prctl is async-signal-safe
        unsafe {
            self.pre_exec(|| {
                // helm must not outlive the installer
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
