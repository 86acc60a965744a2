//! State change hooks: run a user-defined command after each confirmed LED change.
//!
//! Also home of the shell helpers shared with [`crate::transport::CommandTransport`].

use std::io;
use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::controller::{ConfirmationSink, LedChanged};

/// Default timeout for hook commands (30 seconds).
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval when waiting for a child process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Build a platform shell invocation for `command`.
pub(crate) fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Wait for `child` to exit. Kills and reaps it once `timeout` has passed.
///
/// Returns `Ok(None)` when the process had to be killed.
pub(crate) fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
    let _ = child.kill();
    child.wait()?; // reap zombie
    Ok(None)
}

/// Runs `on_change_command` for confirmed LED changes.
///
/// Only one hook runs at a time; a change arriving while the previous hook
/// is still running is skipped with a warning.
#[derive(Debug, Clone)]
pub struct HookRunner {
    command: String,
    timeout: Duration,
    running: Arc<AtomicBool>,
}

impl HookRunner {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.trim().to_string(),
            timeout: HOOK_TIMEOUT,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty()
    }

    /// Spawn the hook in a background thread. Empty commands are ignored.
    ///
    /// Returns `false` if nothing was started.
    pub fn run(&self, change: &LedChanged) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("hook skipped (previous hook still running): {}", self.command);
            return false;
        }
        let command = self.command.clone();
        let timeout = self.timeout;
        let running = Arc::clone(&self.running);
        let state = change.state.to_string();
        let source = change.source.to_string();
        std::thread::spawn(move || {
            let result = run_hook_with_timeout(&command, &state, &source, timeout);
            running.store(false, Ordering::SeqCst);
            match result {
                Ok(Some(s)) if !s.success() => {
                    log::warn!("hook command exited with {s}: {command}");
                }
                Ok(None) => {
                    log::warn!("hook command timed out after {timeout:?}, killed: {command}");
                }
                Err(e) => {
                    log::warn!("hook command failed: {e}: {command}");
                }
                _ => {}
            }
        });
        true
    }

    /// Wait for a running hook to finish. Returns `false` if it is still
    /// running after `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.running.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }
}

impl ConfirmationSink for HookRunner {
    fn confirm(&self, change: &LedChanged) {
        self.run(change);
    }
}

fn run_hook_with_timeout(
    command: &str,
    state: &str,
    source: &str,
    timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    let mut child = shell(command)
        .env("ELITELIGHT_STATE", state)
        .env("ELITELIGHT_SOURCE", source)
        .spawn()?;
    wait_with_timeout(&mut child, timeout)
}
