//! Append-only JSONL event log.
//!
//! One JSON object per line is the durability unit; concurrent appenders go
//! through a mutex over a file opened in append mode, so interleaved lines
//! stay whole. Writes are best-effort: a failed append is logged to the
//! diagnostic log and dropped, it never fails the emitting component.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use wb_common::Result;

use crate::schema::{EventPayload, EventRecord};
use crate::EventSink;

/// Default file name of the event log inside the logs directory.
pub const EVENT_LOG_FILE: &str = "events.jsonl";

/// Append-only JSONL sink backing `logs/events.jsonl`.
pub struct JsonlEventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlEventLog {
    /// Open (creating as needed) the event log under a logs directory.
    pub fn open(logs_dir: &Path) -> Result<Self> {
        Self::at_path(logs_dir.join(EVENT_LOG_FILE))
    }

    /// Open (creating as needed) an event log at an explicit path.
    pub fn at_path(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventLog {
    fn emit(&self, payload: EventPayload) {
        let line = EventRecord::new(payload).to_jsonl();
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!(path = %self.path.display(), error = %e, "event log append failed");
                }
            }
            Err(_) => warn!(path = %self.path.display(), "event log mutex poisoned"),
        }
    }
}
