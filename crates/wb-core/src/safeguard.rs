//! Safeguard snapshots.
//!
//! On every positive detection the reported files are copied into a
//! timestamped directory under `logs/safeguards/` as a recovery fallback
//! for the case where quarantine or restoration itself fails. Only the
//! basename is used for destination naming so a hostile path cannot climb
//! out of the snapshot directory. Copies are set read-only best-effort.
//!
//! The snapshot runs concurrently with quarantine by design: a file the
//! mover won first shows up here as `failed:<source gone>`, which still
//! tells the analyst where the bytes went.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use wb_common::report::{SafeguardOutcome, SafeguardRecord, SafeguardStatus};
use wb_common::Result;

/// Copy `files` into a fresh `<safeguards_root>/<unix_ts>/` directory.
pub fn safeguard_copy(files: &[PathBuf], safeguards_root: &Path) -> Result<SafeguardRecord> {
    fs::create_dir_all(safeguards_root)?;
    let timestamp = Utc::now().timestamp();
    let dest_root = safeguards_root.join(timestamp.to_string());
    fs::create_dir_all(&dest_root)?;

    let copied = files
        .iter()
        .map(|f| copy_one(f, &dest_root))
        .collect::<Vec<_>>();

    info!(
        dest = %dest_root.display(),
        entries = copied.len(),
        "safeguard completed"
    );
    Ok(SafeguardRecord {
        timestamp,
        dest: dest_root,
        copied,
    })
}

fn copy_one(src: &Path, dest_root: &Path) -> SafeguardOutcome {
    let attempt = || -> std::io::Result<PathBuf> {
        let name = src.file_name().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no basename")
        })?;
        let dest = dest_root.join(name);
        fs::copy(src, &dest)?;
        // read-only is advisory; failing to set it must not fail the copy
        if let Ok(metadata) = fs::metadata(&dest) {
            let mut perms = metadata.permissions();
            perms.set_readonly(true);
            let _ = fs::set_permissions(&dest, perms);
        }
        Ok(dest)
    };

    match attempt() {
        Ok(dest) => SafeguardOutcome {
            original: src.to_path_buf(),
            dest: Some(dest),
            status: SafeguardStatus::Copied,
        },
        Err(e) => SafeguardOutcome {
            original: src.to_path_buf(),
            dest: None,
            status: SafeguardStatus::Failed(e.to_string()),
        },
    }
}
