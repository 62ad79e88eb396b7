//! Event-log schema.
//!
//! Every line in `events.jsonl` is one [`EventRecord`]: an integer `ts`
//! (Unix seconds) plus a `type`-discriminated payload. Consumers filter on
//! `type`; unknown types must be skipped, so payloads only ever gain fields.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use wb_common::report::{DetectionReport, SafeguardOutcome, ScoreReport};

/// A `type`-discriminated structured event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// One filesystem notification accepted into the window.
    FsEvent { path: PathBuf },

    /// Result of a scheduled evaluation pass.
    ScanSummary { score_report: ScoreReport },

    /// Result of an operator-requested evaluation pass.
    ManualScan { score_report: ScoreReport },

    /// One positive verdict with the full response report.
    Detection { report: DetectionReport },

    /// Outcome of one termination attempt (principal or child).
    ProcessTermination {
        pid: u32,
        name: String,
        status: String,
        timestamp: i64,
    },

    /// Outcome of one safeguard snapshot pass.
    Safeguard {
        timestamp: i64,
        dest: PathBuf,
        copied: Vec<SafeguardOutcome>,
    },
}

impl EventPayload {
    /// The discriminator written to the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::FsEvent { .. } => "fs_event",
            EventPayload::ScanSummary { .. } => "scan_summary",
            EventPayload::ManualScan { .. } => "manual_scan",
            EventPayload::Detection { .. } => "detection",
            EventPayload::ProcessTermination { .. } => "process_termination",
            EventPayload::Safeguard { .. } => "safeguard",
        }
    }
}

/// An event payload stamped with its emission time.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub ts: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventRecord {
    /// Stamp a payload with the current wall-clock time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            ts: Utc::now().timestamp(),
            payload,
        }
    }

    /// Render as one JSON line. Serialization failures degrade to an error
    /// marker line rather than poisoning the log.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"ts":{},"type":"serialization_failed","kind":"{}"}}"#,
                self.ts,
                self.payload.kind()
            )
        })
    }
}
