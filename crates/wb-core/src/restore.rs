//! Recovery-log replay.
//!
//! The recovery log is append-only JSON lines, one [`QuarantineRecord`] per
//! batch. Listing tolerates malformed lines (they are surfaced, not fatal);
//! replay moves each recorded destination back to
//! `<out_dir>/<basename(original)>`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use wb_common::report::QuarantineRecord;
use wb_common::{Error, Result};

/// One parsed line of the recovery log. `None` marks a malformed line at
/// that index.
pub type LogEntries = Vec<Option<QuarantineRecord>>;

/// Read and parse every line of the recovery log.
pub fn read_entries(log_path: &Path) -> Result<LogEntries> {
    let content = fs::read_to_string(log_path)?;
    Ok(content
        .lines()
        .enumerate()
        .map(|(i, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(line = i, error = %e, "malformed recovery log line");
                None
            }
        })
        .collect())
}

/// Result of replaying one `moved` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The quarantined copy was moved back out.
    Restored { from: PathBuf, to: PathBuf },
    /// The entry recorded no destination (the quarantine attempt failed).
    SkippedNoDestination { original: PathBuf },
    /// The move back failed.
    Failed { from: PathBuf, error: String },
}

/// Replay entry `index` of the recovery log into `out_dir`.
///
/// Each element with a recorded destination is moved to
/// `<out_dir>/<basename(original)>`; the restored content byte-equals what
/// was quarantined.
pub fn restore_entry(log_path: &Path, index: usize, out_dir: &Path) -> Result<Vec<RestoreOutcome>> {
    let entries = read_entries(log_path)?;
    let record = entries
        .get(index)
        .and_then(|e| e.as_ref())
        .ok_or(Error::RecoveryEntry { index })?;

    fs::create_dir_all(out_dir)?;

    let mut outcomes = Vec::with_capacity(record.moved.len());
    for item in &record.moved {
        let Some(dest) = &item.dest else {
            outcomes.push(RestoreOutcome::SkippedNoDestination {
                original: item.original.clone(),
            });
            continue;
        };
        let target = out_dir.join(
            item.original
                .file_name()
                .unwrap_or_else(|| dest.as_os_str()),
        );
        match move_file(dest, &target) {
            Ok(()) => outcomes.push(RestoreOutcome::Restored {
                from: dest.clone(),
                to: target,
            }),
            Err(e) => outcomes.push(RestoreOutcome::Failed {
                from: dest.clone(),
                error: e.to_string(),
            }),
        }
    }
    Ok(outcomes)
}

/// Rename with a copy-then-remove fallback for cross-device targets.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
