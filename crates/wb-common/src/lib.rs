//! Shared foundation for Wavebreak: the configuration model, the unified
//! error type, and the value objects exchanged between the detection engine,
//! the telemetry sink, and the recovery tooling.

pub mod config;
pub mod error;
pub mod report;

pub use config::DetectorConfig;
pub use error::{Error, ErrorCategory, Result};
pub use report::{
    Attribution, DetectionReport, EntropyReason, QuarantineOutcome, QuarantineRecord,
    QuarantineStatus, QuarantineSummary, SafeguardOutcome, SafeguardRecord, SafeguardStatus,
    ScoreDetail, ScoreReport, TerminationOutcome,
};
