//! Diagnostic logging foundation.
//!
//! Dual-mode logging on stderr: human-readable console output for
//! interactive use, JSON lines for service deployments. stdout stays
//! reserved for command payloads. The structured *event log* is a separate
//! concern handled by `wb-telemetry`.
//!
//! Filtering respects `WAVEBREAK_LOG` first, then `RUST_LOG`, then the
//! configured level.

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log verbosity for the default filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Logging configuration resolved at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn human() -> Self {
        Self::default()
    }

    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            ..Self::default()
        }
    }
}

/// Initialize the logging subsystem. Call once at startup.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_env("WAVEBREAK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "wb_core={level},wb_telemetry={level},wb_common={level}",
                level = config.level
            ))
        });

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .init();
        }
    }
}

/// Generate a unique run ID for this invocation, for log correlation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("run-{}", &uuid.to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_prefixed() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn level_display_is_lowercase() {
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn config_presets() {
        assert_eq!(LogConfig::human().format, LogFormat::Human);
        assert_eq!(LogConfig::json().format, LogFormat::Json);
    }
}
