//! Process inspection and termination.
//!
//! The engine talks to processes exclusively through [`ProcessInspector`],
//! which keeps the response pipeline testable and lets hosts without an
//! inspection capability degrade gracefully: every query returns `None` and
//! the engine falls back to file-only response.

pub mod inspect;
pub mod terminate;

use std::path::Path;

pub use inspect::ProcInspector;
pub use terminate::TerminateConfig;
use wb_common::report::TerminationOutcome;

/// Processes at or below this pid are never candidates and never terminated.
pub const CRITICAL_PID_MAX: u32 = 10;

/// Case-insensitive denylist of critical process names.
pub const CRITICAL_NAMES: [&str; 5] = [
    "system",
    "csrss.exe",
    "smss.exe",
    "wininit.exe",
    "services.exe",
];

/// Whether a process must never be terminated.
pub fn is_protected(pid: u32, name: &str) -> bool {
    pid <= CRITICAL_PID_MAX || CRITICAL_NAMES.iter().any(|n| name.eq_ignore_ascii_case(n))
}

/// A process identified during attribution or child discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: String,
}

/// A scored candidate returned by suspicion scanning.
///
/// Score = open regular-file count + whole mebibytes written. Sockets,
/// pipes, and other anonymous fds are not open files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspectProcess {
    pub pid: u32,
    pub name: String,
    pub score: u64,
}

/// Host process inspection capability.
pub trait ProcessInspector: Send + Sync {
    /// Whether this host supports process inspection at all. When false,
    /// every query below returns `None` or empty.
    fn available(&self) -> bool;

    /// The highest-scoring non-protected process, if its score reaches
    /// `min_score`.
    fn enumerate_suspicious(&self, min_score: u64) -> Option<SuspectProcess>;

    /// The first process whose open-file table contains `path` (compared
    /// after absolute-path normalization on both sides).
    fn attribute(&self, path: &Path) -> Option<ProcessRef>;

    /// Recursive children of a process, best effort.
    fn children(&self, pid: u32) -> Vec<ProcessRef>;

    /// Two-phase termination: graceful request, bounded wait, forceful
    /// kill, bounded wait. The caller is responsible for the protected
    /// guard; this method only delivers signals.
    fn terminate(&self, pid: u32) -> TerminationOutcome;
}

/// Inspector for hosts without the capability: every query degrades.
#[derive(Debug, Default)]
pub struct UnavailableInspector;

impl ProcessInspector for UnavailableInspector {
    fn available(&self) -> bool {
        false
    }

    fn enumerate_suspicious(&self, _min_score: u64) -> Option<SuspectProcess> {
        None
    }

    fn attribute(&self, _path: &Path) -> Option<ProcessRef> {
        None
    }

    fn children(&self, _pid: u32) -> Vec<ProcessRef> {
        Vec::new()
    }

    fn terminate(&self, _pid: u32) -> TerminationOutcome {
        TerminationOutcome::Error("process inspection unavailable".to_string())
    }
}
