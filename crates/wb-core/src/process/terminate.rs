//! Two-phase process termination.
//!
//! Graceful first: SIGTERM, then a bounded poll for exit. Only then the
//! forceful phase: SIGKILL with its own bounded poll. Every outcome is
//! recorded; a process that survives both phases is reported `failed` and
//! left to the operator.

use std::thread;
use std::time::{Duration, Instant};

use wb_common::report::TerminationOutcome;
use wb_common::{Error, Result};

/// Timeouts for the two termination phases.
#[derive(Debug, Clone)]
pub struct TerminateConfig {
    /// Wait after the graceful request before escalating.
    pub grace_timeout: Duration,
    /// Wait after the forceful kill before reporting failure.
    pub force_timeout: Duration,
    /// Polling interval while waiting for the process to exit.
    pub poll_interval: Duration,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        Self {
            grace_timeout: Duration::from_secs(3),
            force_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Send a signal to a process.
#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    let result = unsafe { libc::kill(pid as i32, signal) };
    if result == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Err(Error::ProcessNotFound { pid }),
        Some(libc::EPERM) => Err(Error::PermissionDenied { pid }),
        _ => Err(Error::ActionFailed(err.to_string())),
    }
}

/// Check if a process exists. EPERM means it exists but is not ours to
/// signal.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    let result = unsafe { libc::kill(pid as i32, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(unix)]
fn wait_for_exit(pid: u32, timeout: Duration, poll_interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !process_exists(pid) {
            return true;
        }
        thread::sleep(poll_interval);
    }
    !process_exists(pid)
}

/// Two-phase termination of a single process.
#[cfg(unix)]
pub fn terminate_process(pid: u32, cfg: &TerminateConfig) -> TerminationOutcome {
    // Phase 1: graceful
    match send_signal(pid, libc::SIGTERM) {
        Ok(()) => {}
        // already gone is the goal state
        Err(Error::ProcessNotFound { .. }) => return TerminationOutcome::TerminatedGracefully,
        Err(e) => return TerminationOutcome::Error(e.to_string()),
    }
    if wait_for_exit(pid, cfg.grace_timeout, cfg.poll_interval) {
        return TerminationOutcome::TerminatedGracefully;
    }

    // Phase 2: forceful
    match send_signal(pid, libc::SIGKILL) {
        Ok(()) => {}
        Err(Error::ProcessNotFound { .. }) => return TerminationOutcome::KilledForcibly,
        Err(e) => return TerminationOutcome::Error(e.to_string()),
    }
    if wait_for_exit(pid, cfg.force_timeout, cfg.poll_interval) {
        TerminationOutcome::KilledForcibly
    } else {
        TerminationOutcome::Failed
    }
}

#[cfg(not(unix))]
pub fn terminate_process(_pid: u32, _cfg: &TerminateConfig) -> TerminationOutcome {
    TerminationOutcome::Error("signals not supported on this platform".to_string())
}

#[cfg(not(unix))]
pub fn process_exists(_pid: u32) -> bool {
    false
}
