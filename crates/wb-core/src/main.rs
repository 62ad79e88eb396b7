//! `wavebreak`: behavior-driven ransomware detector and first responder.
//!
//! Exit codes: 0 on normal termination, 1 on startup failure.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use wb_common::{DetectorConfig, Error, Result};
use wb_core::logging::{self, LogConfig};
use wb_core::restore::{self, RestoreOutcome};
use wb_core::ui::CallbackUi;
use wb_core::DetectionEngine;
use wb_telemetry::{EventSink, JsonlEventLog};

const EXIT_OK: i32 = 0;
const EXIT_STARTUP_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(
    name = "wavebreak",
    version,
    about = "Behavior-driven ransomware detector and first responder"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch directory roots and respond to bulk-encryption waves
    Watch {
        /// Configuration file (TOML or JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory root to watch; repeatable, appended to the configured
        /// list
        #[arg(long = "path", value_name = "DIR")]
        paths: Vec<PathBuf>,

        /// Quarantine detected files automatically
        #[arg(long)]
        auto_quarantine: bool,

        /// Emit diagnostics as JSON lines
        #[arg(long)]
        log_json: bool,
    },

    /// List or replay recovery-log entries
    Restore {
        /// Recovery log to read
        #[arg(long, value_name = "FILE", default_value = "logs/recovery_log.json")]
        log: PathBuf,

        /// List entries and exit
        #[arg(long)]
        list: bool,

        /// Entry index to replay
        #[arg(long, value_name = "INDEX", conflicts_with = "list")]
        entry: Option<usize>,

        /// Output directory for restored files (defaults to the working
        /// directory)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(e) => {
            eprintln!("wavebreak: {e}");
            std::process::exit(EXIT_STARTUP_FAILURE);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Watch {
            config,
            paths,
            auto_quarantine,
            log_json,
        } => watch(config, paths, auto_quarantine, log_json),
        Command::Restore {
            log,
            list,
            entry,
            out,
        } => restore_cmd(log, list, entry, out),
    }
}

fn watch(
    config: Option<PathBuf>,
    paths: Vec<PathBuf>,
    auto_quarantine: bool,
    log_json: bool,
) -> Result<()> {
    logging::init_logging(&if log_json {
        LogConfig::json()
    } else {
        LogConfig::human()
    });

    let mut cfg = match config {
        Some(path) => DetectorConfig::load(&path)?,
        None => DetectorConfig::default(),
    };
    cfg.watch_paths.extend(paths);
    if auto_quarantine {
        cfg.auto_quarantine = true;
    }
    if cfg.watch_paths.is_empty() {
        return Err(Error::Config(
            "no watch paths configured; pass --path or set watch_paths".into(),
        ));
    }

    let sink: Arc<dyn EventSink> = Arc::new(JsonlEventLog::open(&cfg.logs_dir)?);
    let ui = Arc::new(CallbackUi::new(|message| println!("{message}")));

    let mut engine = DetectionEngine::new(cfg, sink, ui)?;
    engine.start()?;
    info!(run_id = %logging::generate_run_id(), "wavebreak watching");

    // run until the process is terminated; response tasks are daemonic
    loop {
        std::thread::park();
    }
}

fn restore_cmd(
    log: PathBuf,
    list: bool,
    entry: Option<usize>,
    out: Option<PathBuf>,
) -> Result<()> {
    if list {
        let entries = match restore::read_entries(&log) {
            Ok(entries) => entries,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("No recovery log found: {}", log.display());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        for (i, entry) in entries.iter().enumerate() {
            match entry {
                Some(record) => {
                    println!(
                        "Entry {i}: ts={}, moved={} files",
                        record.timestamp,
                        record.moved.len()
                    );
                    let statuses: Vec<String> = record
                        .moved
                        .iter()
                        .take(5)
                        .map(|m| m.status.to_string())
                        .collect();
                    if !statuses.is_empty() {
                        println!("   sample statuses: {}", statuses.join(","));
                    }
                }
                None => println!("Malformed line {i}"),
            }
        }
        return Ok(());
    }

    let Some(index) = entry else {
        return Err(Error::Config("specify --list or --entry <INDEX>".into()));
    };
    let out_dir = out.unwrap_or_else(|| PathBuf::from("."));
    for outcome in restore::restore_entry(&log, index, &out_dir)? {
        match outcome {
            RestoreOutcome::Restored { from, to } => {
                println!("Restored {} -> {}", from.display(), to.display());
            }
            RestoreOutcome::SkippedNoDestination { original } => {
                println!("Skipping (no dest recorded): {}", original.display());
            }
            RestoreOutcome::Failed { from, error } => {
                println!("Failed restore of {}: {error}", from.display());
            }
        }
    }
    Ok(())
}
