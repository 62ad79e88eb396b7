//! Value objects produced by the detection and response pipeline.
//!
//! Quarantine and attribution outcomes serialize as 3-element JSON arrays
//! (`[original, dest_or_null, status]`) so the on-disk recovery log stays
//! consumable by external restore tooling; the deserializer additionally
//! accepts legacy 2-element arrays, which imply status `moved`.

use std::fmt;
use std::path::PathBuf;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Why a sampled file contributed (or not) to the threat score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntropyReason {
    High,
    Low,
    NoSamples,
}

/// Per-file breakdown entry of a scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetail {
    /// Sampled entropy, absent for the `no-samples` marker.
    pub entropy: Option<f64>,
    pub reason: EntropyReason,
}

/// Result of one scoring pass: a 0-100 threat score plus per-file details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Clamped to [0, 100], rounded to one decimal.
    pub score: f64,
    pub details: Vec<ScoreDetail>,
}

/// Outcome of a single quarantine attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineStatus {
    Moved,
    CopiedAndRemoved,
    CopiedButRemoveFailedPermission,
    CopiedButRemoveFailed(String),
    CopyFailed(String),
    Failed(String),
    FileNotFound,
    IsDirectory,
    InvalidPath,
}

impl QuarantineStatus {
    /// Whether the original no longer sits in the watched tree.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            QuarantineStatus::Moved | QuarantineStatus::CopiedAndRemoved
        )
    }
}

impl fmt::Display for QuarantineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarantineStatus::Moved => write!(f, "moved"),
            QuarantineStatus::CopiedAndRemoved => write!(f, "copied_and_removed"),
            QuarantineStatus::CopiedButRemoveFailedPermission => {
                write!(f, "copied_but_remove_failed_permission")
            }
            QuarantineStatus::CopiedButRemoveFailed(detail) => {
                write!(f, "copied_but_remove_failed:{detail}")
            }
            QuarantineStatus::CopyFailed(detail) => write!(f, "copy_failed:{detail}"),
            QuarantineStatus::Failed(detail) => write!(f, "failed:{detail}"),
            QuarantineStatus::FileNotFound => write!(f, "file_not_found"),
            QuarantineStatus::IsDirectory => write!(f, "is_directory"),
            QuarantineStatus::InvalidPath => write!(f, "invalid_path"),
        }
    }
}

impl From<&str> for QuarantineStatus {
    fn from(s: &str) -> Self {
        match s {
            "moved" => QuarantineStatus::Moved,
            "copied_and_removed" => QuarantineStatus::CopiedAndRemoved,
            "copied_but_remove_failed_permission" => {
                QuarantineStatus::CopiedButRemoveFailedPermission
            }
            "file_not_found" => QuarantineStatus::FileNotFound,
            "is_directory" => QuarantineStatus::IsDirectory,
            "invalid_path" => QuarantineStatus::InvalidPath,
            other => {
                if let Some(detail) = other.strip_prefix("copied_but_remove_failed:") {
                    QuarantineStatus::CopiedButRemoveFailed(detail.to_string())
                } else if let Some(detail) = other.strip_prefix("copy_failed:") {
                    QuarantineStatus::CopyFailed(detail.to_string())
                } else if let Some(detail) = other.strip_prefix("failed:") {
                    QuarantineStatus::Failed(detail.to_string())
                } else {
                    QuarantineStatus::Failed(other.to_string())
                }
            }
        }
    }
}

impl Serialize for QuarantineStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QuarantineStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(QuarantineStatus::from(s.as_str()))
    }
}

/// One quarantined (or attempted) file: original path, destination when one
/// was produced, and the status of the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineOutcome {
    pub original: PathBuf,
    pub dest: Option<PathBuf>,
    pub status: QuarantineStatus,
}

impl Serialize for QuarantineOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.original)?;
        seq.serialize_element(&self.dest)?;
        seq.serialize_element(&self.status.to_string())?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for QuarantineOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OutcomeVisitor;

        impl<'de> Visitor<'de> for OutcomeVisitor {
            type Value = QuarantineOutcome;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an [original, dest, status] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let original: PathBuf = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let dest: Option<PathBuf> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                // legacy entries carry no status; treat them as plain moves
                let status = match seq.next_element::<String>()? {
                    Some(s) => QuarantineStatus::from(s.as_str()),
                    None => QuarantineStatus::Moved,
                };
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(QuarantineOutcome {
                    original,
                    dest,
                    status,
                })
            }
        }

        deserializer.deserialize_seq(OutcomeVisitor)
    }
}

/// One recovery-log line: the durable record of a quarantine batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub timestamp: i64,
    pub moved: Vec<QuarantineOutcome>,
    pub total_files: usize,
    pub successful: usize,
}

/// Quarantine progress as reported inside a detection event. The batch runs
/// on its own thread, so the event can only promise that it was started; the
/// recovery log carries the actual outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum QuarantineSummary {
    /// Auto-quarantine is disabled; nothing was attempted.
    Disabled,
    /// A quarantine batch has been spawned and may still be running.
    InProgress,
    /// Outcomes known at emission time (manual or completed batches).
    Completed(Vec<QuarantineOutcome>),
}

impl Serialize for QuarantineSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QuarantineSummary::Disabled => serializer.serialize_seq(Some(0))?.end(),
            QuarantineSummary::InProgress => ["in_progress"].serialize(serializer),
            QuarantineSummary::Completed(outcomes) => outcomes.serialize(serializer),
        }
    }
}

/// Outcome of one safeguard copy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafeguardStatus {
    Copied,
    Failed(String),
}

impl fmt::Display for SafeguardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafeguardStatus::Copied => write!(f, "copied"),
            SafeguardStatus::Failed(detail) => write!(f, "failed:{detail}"),
        }
    }
}

/// One safeguarded file, tuple-encoded like quarantine outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeguardOutcome {
    pub original: PathBuf,
    pub dest: Option<PathBuf>,
    pub status: SafeguardStatus,
}

impl Serialize for SafeguardOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.original)?;
        seq.serialize_element(&self.dest)?;
        seq.serialize_element(&self.status.to_string())?;
        seq.end()
    }
}

/// Summary of one safeguard snapshot pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafeguardRecord {
    pub timestamp: i64,
    pub dest: PathBuf,
    pub copied: Vec<SafeguardOutcome>,
}

/// Outcome of a two-phase process termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    TerminatedGracefully,
    KilledForcibly,
    Failed,
    Error(String),
}

impl TerminationOutcome {
    /// Whether the target process is gone.
    pub fn is_kill(&self) -> bool {
        matches!(
            self,
            TerminationOutcome::TerminatedGracefully | TerminationOutcome::KilledForcibly
        )
    }

    /// Status string recorded for the principal process.
    pub fn principal_label(&self) -> &'static str {
        match self {
            TerminationOutcome::TerminatedGracefully => "terminated_gracefully",
            TerminationOutcome::KilledForcibly => "killed_forcibly",
            TerminationOutcome::Failed => "failed",
            TerminationOutcome::Error(_) => "error",
        }
    }

    /// Status string recorded for a child of the principal. Children report
    /// per-child independent outcomes under a `child_` prefix.
    pub fn child_label(&self) -> String {
        match self {
            TerminationOutcome::TerminatedGracefully | TerminationOutcome::KilledForcibly => {
                "child_terminated".to_string()
            }
            TerminationOutcome::Failed => "child_failed".to_string(),
            TerminationOutcome::Error(detail) => format!("child_error:{detail}"),
        }
    }
}

/// Mapping of a file to the process holding it open at detection time.
pub type Attribution = (PathBuf, Option<u32>, Option<String>);

/// The output of one positive verdict, emitted exactly once per detection.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub timestamp: i64,
    pub files_quarantined: QuarantineSummary,
    pub attributed: Vec<Attribution>,
    pub process_killed: Option<(u32, String)>,
    pub sample_entropies: Vec<f64>,
    pub score_report: ScoreReport,
}
