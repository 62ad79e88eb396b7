//! `/proc`-backed process inspection.
//!
//! Suspicion scoring combines two cheap signals readable without ptrace:
//! the number of regular files a process holds open and its cumulative
//! `write_bytes` I/O counter. Sockets, pipes, and anonymous inodes do not
//! count as open files; a server juggling thousands of connections is not
//! suspicious for it. Processes we cannot read (permission, races with
//! exit) are skipped, not errors: enumeration is best effort.

use std::path::Path;

use tracing::info;

use wb_common::report::TerminationOutcome;

use super::terminate::{self, TerminateConfig};
use super::{is_protected, ProcessInspector, ProcessRef, SuspectProcess, CRITICAL_PID_MAX};

/// Live inspector reading the `/proc` filesystem.
#[derive(Debug, Default)]
pub struct ProcInspector {
    term: TerminateConfig,
}

impl ProcInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terminate_config(term: TerminateConfig) -> Self {
        Self { term }
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use std::path::PathBuf;

    pub fn capability_available() -> bool {
        Path::new("/proc/self/stat").exists()
    }

    /// Numeric entries of /proc.
    pub fn list_pids() -> Vec<u32> {
        let mut pids = Vec::new();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return pids;
        };
        for entry in entries.flatten() {
            if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                pids.push(pid);
            }
        }
        pids
    }

    pub fn comm(pid: u32) -> Option<String> {
        std::fs::read_to_string(format!("/proc/{pid}/comm"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Paths of fds that refer to regular files, the process's open-file
    /// table for scoring and attribution. Fd links that do not resolve to
    /// a real path (`socket:[..]`, `pipe:[..]`, `anon_inode:..`) or whose
    /// target no longer exists as a regular file are excluded. `None` when
    /// the fd table is unreadable (permission or exit).
    pub fn open_files(pid: u32) -> Option<Vec<PathBuf>> {
        let entries = std::fs::read_dir(format!("/proc/{pid}/fd")).ok()?;
        let mut paths = Vec::new();
        for entry in entries.flatten() {
            let Ok(target) = std::fs::read_link(entry.path()) else {
                continue;
            };
            if !target.is_absolute() {
                continue;
            }
            if std::fs::metadata(&target)
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                paths.push(target);
            }
        }
        Some(paths)
    }

    /// Cumulative bytes written, from /proc/[pid]/io. Zero when unreadable.
    pub fn write_bytes(pid: u32) -> u64 {
        let Ok(content) = std::fs::read_to_string(format!("/proc/{pid}/io")) else {
            return 0;
        };
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("write_bytes:") {
                return rest.trim().parse().unwrap_or(0);
            }
        }
        0
    }

    /// Parent pid from /proc/[pid]/stat. The comm field may contain spaces
    /// and parentheses, so fields are taken after the last ')'.
    pub fn ppid(pid: u32) -> Option<u32> {
        let content = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let comm_end = content.rfind(')')?;
        let after_comm = content.get(comm_end + 2..)?;
        // after comm: state ppid pgrp ...
        after_comm.split_whitespace().nth(1)?.parse().ok()
    }
}

#[cfg(target_os = "linux")]
impl ProcessInspector for ProcInspector {
    fn available(&self) -> bool {
        imp::capability_available()
    }

    fn enumerate_suspicious(&self, min_score: u64) -> Option<SuspectProcess> {
        if !self.available() {
            return None;
        }

        let mut top: Option<SuspectProcess> = None;
        for pid in imp::list_pids() {
            if pid <= CRITICAL_PID_MAX {
                continue;
            }
            let Some(name) = imp::comm(pid) else {
                continue;
            };
            if is_protected(pid, &name) {
                continue;
            }
            // fd table unreadable means we cannot score this process
            let Some(open) = imp::open_files(pid) else {
                continue;
            };
            let score = open.len() as u64 + imp::write_bytes(pid) / (1024 * 1024);

            if top.as_ref().map_or(true, |t| score > t.score) {
                top = Some(SuspectProcess { pid, name, score });
            }
        }

        let top = top.filter(|t| t.score >= min_score);
        if let Some(suspect) = &top {
            info!(
                pid = suspect.pid,
                name = %suspect.name,
                score = suspect.score,
                "detected suspicious process"
            );
        }
        top
    }

    fn attribute(&self, path: &Path) -> Option<ProcessRef> {
        if !self.available() {
            return None;
        }
        let target = std::fs::canonicalize(path).ok()?;

        for pid in imp::list_pids() {
            for open in imp::open_files(pid).unwrap_or_default() {
                if open == target {
                    let name = imp::comm(pid).unwrap_or_default();
                    return Some(ProcessRef { pid, name });
                }
            }
        }
        None
    }

    fn children(&self, pid: u32) -> Vec<ProcessRef> {
        if !self.available() {
            return Vec::new();
        }

        let all = imp::list_pids();
        let mut result = Vec::new();
        let mut frontier = vec![pid];
        // bounded by the process table; each pass collects one generation
        while let Some(parent) = frontier.pop() {
            for &candidate in &all {
                if candidate == pid || result.iter().any(|r: &ProcessRef| r.pid == candidate) {
                    continue;
                }
                if imp::ppid(candidate) == Some(parent) {
                    let name = imp::comm(candidate).unwrap_or_default();
                    result.push(ProcessRef {
                        pid: candidate,
                        name,
                    });
                    frontier.push(candidate);
                }
            }
        }
        result
    }

    fn terminate(&self, pid: u32) -> TerminationOutcome {
        terminate::terminate_process(pid, &self.term)
    }
}

#[cfg(not(target_os = "linux"))]
impl ProcessInspector for ProcInspector {
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

    fn terminate(&self, pid: u32) -> TerminationOutcome {
        terminate::terminate_process(pid, &self.term)
    }
}

#[cfg(test)]
#[cfg(target_os = "linux")]
mod tests {
    use super::*;
    use std::io::Write;
    use std::process::{Command, Stdio};

    #[test]
    fn capability_detected_on_proc_hosts() {
        let inspector = ProcInspector::new();
        assert!(inspector.available());
    }

    #[test]
    fn self_is_enumerable() {
        let pid = std::process::id();
        assert!(imp::comm(pid).is_some());
        assert!(imp::open_files(pid).is_some());
    }

    #[test]
    fn open_files_counts_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("held.bin");
        let file = std::fs::File::create(&path).unwrap();
        let target = std::fs::canonicalize(&path).unwrap();

        let open = imp::open_files(std::process::id()).expect("own fd table is readable");
        assert!(
            open.iter().any(|p| p == &target),
            "expected {target:?} in {open:?}"
        );
        // stdio pipes, the tty, sockets: none of them are files
        assert!(open.iter().all(|p| p.is_file()));
        drop(file);
    }

    #[test]
    fn ppid_of_self_is_parent() {
        let pid = std::process::id();
        let ppid = imp::ppid(pid).expect("self ppid");
        assert!(ppid >= 1);
    }

    #[test]
    fn attribute_finds_holder_of_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("held.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"held open").unwrap();

        let inspector = ProcInspector::new();
        let holder = inspector
            .attribute(&path)
            .expect("this process holds the file open");
        assert_eq!(holder.pid, std::process::id());
        drop(file);
    }

    #[test]
    fn attribute_missing_file_is_none() {
        let inspector = ProcInspector::new();
        assert!(inspector
            .attribute(Path::new("/nonexistent/wavebreak.bin"))
            .is_none());
    }

    #[test]
    fn children_finds_spawned_process() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn sleep");

        let inspector = ProcInspector::new();
        let children = inspector.children(std::process::id());
        assert!(
            children.iter().any(|c| c.pid == child.id()),
            "expected child {} in {children:?}",
            child.id()
        );

        let _ = child.kill();
        let _ = child.wait();
    }
}
