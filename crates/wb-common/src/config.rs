//! Detector configuration.
//!
//! All values are read once at engine start; live reconfiguration is not
//! supported. Files may be TOML or JSON, selected by extension, and every
//! field falls back to the production default when omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable per-run configuration for the detection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Age cutoff for the sliding event window, in seconds.
    pub window_seconds: u64,

    /// Seconds between scheduled evaluations.
    pub check_interval: u64,

    /// Minimum events in the window to consider a wave.
    pub modified_threshold: usize,

    /// Per-file entropy at/above which a sample counts as high-entropy.
    pub entropy_threshold: f64,

    /// Minimum high-entropy samples for the hard wave verdict.
    pub high_entropy_count: usize,

    /// Upper bound on files entropy-sampled per evaluation.
    pub sample_entropy_count: usize,

    /// Alternate OR-gated numeric trigger (0-100).
    pub detection_score_threshold: f64,

    /// Minimum process score to flag or kill a candidate.
    pub process_suspicion_score: u64,

    /// Root directory for quarantine moves.
    pub quarantine_dir: PathBuf,

    /// Whether a positive verdict triggers quarantine.
    pub auto_quarantine: bool,

    /// Bytes sampled from the head of each file for entropy.
    pub sample_bytes: usize,

    /// Directory for the event log, recovery log, and safeguard snapshots.
    pub logs_dir: PathBuf,

    /// Directory roots to watch recursively.
    pub watch_paths: Vec<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_seconds: 10,
            check_interval: 3,
            modified_threshold: 12,
            entropy_threshold: 7.5,
            high_entropy_count: 6,
            sample_entropy_count: 20,
            detection_score_threshold: 60.0,
            process_suspicion_score: 5,
            quarantine_dir: PathBuf::from("./quarantine"),
            auto_quarantine: false,
            sample_bytes: 4096,
            logs_dir: PathBuf::from("./logs"),
            watch_paths: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Load configuration from a TOML or JSON file, then validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid JSON in {}: {e}", path.display())))?,
            _ => toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid TOML in {}: {e}", path.display())))?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate ranges. Rejects configurations that would render the engine
    /// inert (zero windows or intervals) or nonsensical thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.window_seconds == 0 {
            return Err(Error::InvalidConfigValue {
                field: "window_seconds",
                reason: "must be at least 1".into(),
            });
        }
        if self.check_interval == 0 {
            return Err(Error::InvalidConfigValue {
                field: "check_interval",
                reason: "must be at least 1".into(),
            });
        }
        if self.modified_threshold == 0 {
            return Err(Error::InvalidConfigValue {
                field: "modified_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if self.sample_entropy_count == 0 {
            return Err(Error::InvalidConfigValue {
                field: "sample_entropy_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.sample_bytes == 0 {
            return Err(Error::InvalidConfigValue {
                field: "sample_bytes",
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=8.0).contains(&self.entropy_threshold) {
            return Err(Error::InvalidConfigValue {
                field: "entropy_threshold",
                reason: format!("{} is outside [0, 8]", self.entropy_threshold),
            });
        }
        if !(0.0..=100.0).contains(&self.detection_score_threshold) {
            return Err(Error::InvalidConfigValue {
                field: "detection_score_threshold",
                reason: format!("{} is outside [0, 100]", self.detection_score_threshold),
            });
        }
        Ok(())
    }

    /// Path of the append-only recovery log.
    pub fn recovery_log_path(&self) -> PathBuf {
        self.logs_dir.join("recovery_log.json")
    }

    /// Root under which timestamped safeguard snapshots are created.
    pub fn safeguards_dir(&self) -> PathBuf {
        self.logs_dir.join("safeguards")
    }
}
