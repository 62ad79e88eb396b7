//! Batch file quarantine.
//!
//! Suspect files are relocated into an isolated directory under
//! collision-free names. A rename is attempted first; when the OS refuses
//! (locked file, cross-device move), the fallback is copy-then-remove, and
//! a copy whose original could not be removed still counts as quarantined
//! with the original flagged in its status.
//!
//! Each batch appends one [`QuarantineRecord`] JSON line to the recovery
//! log. Log writing is best-effort; its failure never fails the batch.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, error, info};

use wb_common::report::{QuarantineOutcome, QuarantineRecord, QuarantineStatus};
use wb_common::Result;

/// Quarantine a batch of files into `quarantine_dir`, appending the batch
/// record to the recovery log at `recovery_log`.
///
/// Per-path problems become statuses; only failure to create the
/// quarantine directory itself aborts the batch.
pub fn quarantine_files(
    paths: &[PathBuf],
    quarantine_dir: &Path,
    recovery_log: &Path,
) -> Result<QuarantineRecord> {
    fs::create_dir_all(quarantine_dir)?;
    let timestamp = Utc::now().timestamp();

    let mut moved = Vec::with_capacity(paths.len());
    for (idx, path) in paths.iter().enumerate() {
        let outcome = quarantine_one(path, idx, timestamp, quarantine_dir);
        debug!(
            original = %outcome.original.display(),
            status = %outcome.status,
            "quarantine outcome"
        );
        moved.push(outcome);
    }

    let record = QuarantineRecord {
        timestamp,
        successful: moved.iter().filter(|m| m.status.is_success()).count(),
        total_files: paths.len(),
        moved,
    };

    if let Err(e) = append_record(recovery_log, &record) {
        error!(path = %recovery_log.display(), error = %e, "failed to write recovery log");
    }

    info!(
        total = record.total_files,
        successful = record.successful,
        "quarantine batch completed"
    );
    Ok(record)
}

fn quarantine_one(path: &Path, idx: usize, timestamp: i64, dir: &Path) -> QuarantineOutcome {
    let fail = |status: QuarantineStatus| QuarantineOutcome {
        original: path.to_path_buf(),
        dest: None,
        status,
    };

    if path.as_os_str().is_empty() {
        return fail(QuarantineStatus::InvalidPath);
    }
    if !path.exists() {
        return fail(QuarantineStatus::FileNotFound);
    }
    if path.is_dir() {
        return fail(QuarantineStatus::IsDirectory);
    }

    let safe_name = sanitize_name(path);
    let dest = unique_destination(dir.join(format!("{timestamp}_{idx}_{safe_name}")));

    match fs::rename(path, &dest) {
        Ok(()) => QuarantineOutcome {
            original: path.to_path_buf(),
            dest: Some(dest),
            status: QuarantineStatus::Moved,
        },
        Err(e) if e.kind() == ErrorKind::PermissionDenied => copy_fallback(path, dest, true),
        Err(_) => copy_fallback(path, dest, false),
    }
}

/// The copy-then-remove path taken when a rename is refused. `permission`
/// distinguishes the status used when even the copy fails.
///
/// `fs::copy` carries content and permission bits; timestamps are carried
/// over separately so a recovered file looks like the one that was taken.
fn copy_fallback(path: &Path, dest: PathBuf, permission: bool) -> QuarantineOutcome {
    match fs::copy(path, &dest) {
        Ok(_) => {
            copy_file_times(path, &dest);
            let status = match fs::remove_file(path) {
                Ok(()) => QuarantineStatus::CopiedAndRemoved,
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    QuarantineStatus::CopiedButRemoveFailedPermission
                }
                Err(e) => QuarantineStatus::CopiedButRemoveFailed(e.to_string()),
            };
            QuarantineOutcome {
                original: path.to_path_buf(),
                dest: Some(dest),
                status,
            }
        }
        Err(e) => QuarantineOutcome {
            original: path.to_path_buf(),
            dest: None,
            status: if permission {
                QuarantineStatus::CopyFailed(e.to_string())
            } else {
                QuarantineStatus::Failed(e.to_string())
            },
        },
    }
}

/// Stamp the original's atime/mtime onto the copy, best effort. Read the
/// source metadata before the original is removed.
fn copy_file_times(src: &Path, dest: &Path) {
    if let Ok(meta) = fs::metadata(src) {
        let atime = filetime::FileTime::from_last_access_time(&meta);
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        let _ = filetime::set_file_times(dest, atime, mtime);
    }
}

/// Basename reduced to alphanumerics, `.`, `_`, `-`, and space.
fn sanitize_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || "._- ".contains(*c))
        .collect()
}

/// Resolve collisions by appending `_1`, `_2`, ... before the extension
/// until the destination is unique.
fn unique_destination(base: PathBuf) -> PathBuf {
    if !base.exists() {
        return base;
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 0u32;
    loop {
        counter += 1;
        let name = match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = base.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
    }
}

fn append_record(recovery_log: &Path, record: &QuarantineRecord) -> Result<()> {
    if let Some(parent) = recovery_log.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(recovery_log)?;
    writeln!(file, "{}", serde_json::to_string(record)?)?;
    Ok(())
}
