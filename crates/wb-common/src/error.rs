//! Error types for Wavebreak.
//!
//! Structured error handling with stable numeric codes for machine parsing,
//! category classification for grouping, and recoverability hints. Everything
//! below the engine's evaluator loop is swallowed and recorded; only startup
//! errors reach callers of this type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Wavebreak operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration loading and validation errors.
    Config,
    /// Filesystem watch subscription errors.
    Watch,
    /// Process enumeration and attribution errors.
    Collection,
    /// Process termination errors.
    Action,
    /// Quarantine and recovery-log errors.
    Quarantine,
    /// File I/O and serialization errors.
    Io,
    /// Platform capability errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Config => "config",
            ErrorCategory::Watch => "watch",
            ErrorCategory::Collection => "collection",
            ErrorCategory::Action => "action",
            ErrorCategory::Quarantine => "quarantine",
            ErrorCategory::Io => "io",
            ErrorCategory::Platform => "platform",
        };
        write!(f, "{s}")
    }
}

/// Unified error type for Wavebreak.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration value for `{field}`: {reason}")]
    InvalidConfigValue { field: &'static str, reason: String },

    // Watch errors (20-29)
    #[error("failed to start filesystem watcher: {0}")]
    WatchStart(String),

    #[error("none of the configured watch paths exist")]
    NoWatchableRoots,

    // Collection errors (30-39)
    #[error("process collection failed: {0}")]
    Collection(String),

    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    #[error("permission denied signalling process {pid}")]
    PermissionDenied { pid: u32 },

    // Action errors (40-49)
    #[error("action execution failed: {0}")]
    ActionFailed(String),

    #[error("termination blocked for protected process {pid} ({name})")]
    ProtectedProcess { pid: u32, name: String },

    // Quarantine and recovery errors (50-59)
    #[error("quarantine failed: {0}")]
    Quarantine(String),

    #[error("recovery entry {index} out of range or malformed")]
    RecoveryEntry { index: usize },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("capability not available: {0}")]
    CapabilityMissing(String),
}

impl Error {
    /// Returns the stable error code for this error.
    ///
    /// Codes are grouped by category:
    /// - 10-19: Configuration
    /// - 20-29: Watch
    /// - 30-39: Collection
    /// - 40-49: Action
    /// - 50-59: Quarantine / recovery
    /// - 60-69: I/O
    /// - 70-79: Platform
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfigValue { .. } => 11,
            Error::WatchStart(_) => 20,
            Error::NoWatchableRoots => 21,
            Error::Collection(_) => 30,
            Error::ProcessNotFound { .. } => 31,
            Error::PermissionDenied { .. } => 32,
            Error::ActionFailed(_) => 40,
            Error::ProtectedProcess { .. } => 41,
            Error::Quarantine(_) => 50,
            Error::RecoveryEntry { .. } => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::CapabilityMissing(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfigValue { .. } => ErrorCategory::Config,
            Error::WatchStart(_) | Error::NoWatchableRoots => ErrorCategory::Watch,
            Error::Collection(_)
            | Error::ProcessNotFound { .. }
            | Error::PermissionDenied { .. } => ErrorCategory::Collection,
            Error::ActionFailed(_) | Error::ProtectedProcess { .. } => ErrorCategory::Action,
            Error::Quarantine(_) | Error::RecoveryEntry { .. } => ErrorCategory::Quarantine,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
            Error::CapabilityMissing(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether this error is potentially recoverable by retrying,
    /// fixing configuration, or elevating privileges.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidConfigValue { .. } => true,
            Error::WatchStart(_) => true,
            Error::NoWatchableRoots => true,
            Error::Collection(_) => true,
            Error::ProcessNotFound { .. } => false, // process is gone
            Error::PermissionDenied { .. } => true, // can elevate
            Error::ActionFailed(_) => true,
            Error::ProtectedProcess { .. } => false, // guard is intentional
            Error::Quarantine(_) => true,
            Error::RecoveryEntry { .. } => false,
            Error::Io(_) => true,
            Error::Json(_) => true,
            Error::CapabilityMissing(_) => false,
        }
    }
}
