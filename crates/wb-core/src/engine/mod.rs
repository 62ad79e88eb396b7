//! Detection engine.
//!
//! The orchestrator: owns the filesystem watcher and the periodic evaluator,
//! crosses the window statistics with the scorer every tick, and on a
//! positive verdict drives the response pipeline (quarantine, process
//! attribution and termination, safeguard snapshot) in failure-isolated
//! tasks. An exception in one response stage never prevents another, and
//! the `detection` event is emitted even if every stage fails.
//!
//! States: `Idle` until `start`, then `Running`; response activity overlaps
//! `Running` (new ticks are processed normally while a response batch is
//! still in flight), and `stop` returns to `Idle` with a bounded wait for
//! the watcher.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use wb_common::report::{
    Attribution, DetectionReport, QuarantineSummary, ScoreReport, TerminationOutcome,
};
use wb_common::{DetectorConfig, Result};
use wb_telemetry::{EventPayload, EventSink};

use crate::entropy;
use crate::process::{is_protected, ProcInspector, ProcessInspector};
use crate::quarantine;
use crate::safeguard;
use crate::score;
use crate::ui::UiSink;
use crate::watcher::FsWatcher;
use crate::window::EventAggregator;

const EVALUATOR_POLL: Duration = Duration::from_millis(100);

struct EngineShared {
    cfg: DetectorConfig,
    aggregator: Arc<EventAggregator>,
    sink: Arc<dyn EventSink>,
    ui: Arc<dyn UiSink>,
    inspector: Arc<dyn ProcessInspector>,
    running: AtomicBool,
}

/// The detection and response orchestrator.
pub struct DetectionEngine {
    shared: Arc<EngineShared>,
    watcher: Option<FsWatcher>,
    evaluator: Option<JoinHandle<()>>,
}

impl DetectionEngine {
    /// Build an engine over a validated configuration. The default process
    /// inspector reads `/proc`; hosts without that capability degrade to
    /// file-only response automatically.
    pub fn new(
        cfg: DetectorConfig,
        sink: Arc<dyn EventSink>,
        ui: Arc<dyn UiSink>,
    ) -> Result<Self> {
        cfg.validate()?;
        let aggregator = Arc::new(EventAggregator::new(
            cfg.window_seconds,
            sink.clone(),
            ui.clone(),
        ));
        Ok(Self {
            shared: Arc::new(EngineShared {
                cfg,
                aggregator,
                sink,
                ui,
                inspector: Arc::new(ProcInspector::new()),
                running: AtomicBool::new(false),
            }),
            watcher: None,
            evaluator: None,
        })
    }

    /// Replace the process inspector. Must be called before `start`.
    pub fn with_inspector(mut self, inspector: Arc<dyn ProcessInspector>) -> Self {
        let shared = Arc::get_mut(&mut self.shared)
            .expect("with_inspector must be called before the engine is started");
        shared.inspector = inspector;
        self
    }

    /// The aggregator fed by the watcher. Exposed so embedders can inject
    /// events from their own sources.
    pub fn aggregator(&self) -> Arc<EventAggregator> {
        self.shared.aggregator.clone()
    }

    /// Record one filesystem event directly, bypassing the watcher.
    pub fn record_event(&self, path: &std::path::Path) {
        self.shared.aggregator.record(path);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Spawn the watcher and the periodic evaluator.
    ///
    /// Startup errors (no watchable root, watch subscription failure)
    /// propagate; everything after this point is swallowed and recorded.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let watcher = FsWatcher::start(&self.shared.cfg.watch_paths, self.aggregator())?;
        self.watcher = Some(watcher);
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        self.evaluator = Some(
            thread::Builder::new()
                .name("wb-evaluator".into())
                .spawn(move || Self::evaluator_loop(shared))?,
        );

        info!(
            paths = self.shared.cfg.watch_paths.len(),
            interval = self.shared.cfg.check_interval,
            "monitoring started"
        );
        self.shared.ui.notify("Started monitoring");
        Ok(())
    }

    /// Stop the watcher (bounded wait) and cancel the evaluator. In-flight
    /// response tasks are daemonic: they keep running and may be torn down
    /// at process exit.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(evaluator) = self.evaluator.take() {
            let _ = evaluator.join();
        }
        info!("monitoring stopped");
        self.shared.ui.notify("Stopped monitoring");
    }

    /// One-shot manual evaluation, outside the schedule. Emits a
    /// `manual_scan` event and runs the full response pipeline on a
    /// positive verdict.
    pub fn check_now(&self) {
        let shared = &self.shared;
        let recent = shared.aggregator.drain_recent();
        if recent.is_empty() {
            shared.ui.notify("No recent events to scan");
            return;
        }

        let entropies = Self::sample_entropies(shared, &recent);
        let report = score::score_files(recent.len(), &entropies, &shared.cfg);
        shared.sink.emit(EventPayload::ManualScan {
            score_report: report.clone(),
        });

        if Self::verdict(shared, recent.len(), &entropies, &report) {
            Self::on_detection(shared, &recent, &entropies, &report);
        }
    }

    fn evaluator_loop(shared: Arc<EngineShared>) {
        while shared.running.load(Ordering::SeqCst) {
            if !Self::sleep_while_running(&shared, Duration::from_secs(shared.cfg.check_interval))
            {
                break;
            }
            // a crashed evaluator must not silently stop monitoring
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| Self::tick(&shared)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "error in evaluator tick");
                    shared
                        .ui
                        .notify(&format!("Error in monitor thread: {e}"));
                }
                Err(_) => {
                    error!("evaluator tick panicked");
                    shared
                        .ui
                        .notify("Error in monitor thread: internal panic");
                }
            }
        }
    }

    /// Chunked sleep that wakes promptly on `stop`. Returns false when the
    /// engine stopped during the wait.
    fn sleep_while_running(shared: &EngineShared, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if !shared.running.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(EVALUATOR_POLL));
        }
    }

    fn tick(shared: &Arc<EngineShared>) -> Result<()> {
        let recent = shared.aggregator.drain_recent();
        if recent.is_empty() {
            return Ok(());
        }

        let entropies = Self::sample_entropies(shared, &recent);
        let report = score::score_files(recent.len(), &entropies, &shared.cfg);
        shared.sink.emit(EventPayload::ScanSummary {
            score_report: report.clone(),
        });

        if Self::verdict(shared, recent.len(), &entropies, &report) {
            Self::on_detection(shared, &recent, &entropies, &report);
        }

        // informational only; nothing is killed outside of a detection
        if let Some(suspect) = shared
            .inspector
            .enumerate_suspicious(shared.cfg.process_suspicion_score)
        {
            shared
                .ui
                .notify(&format!("Suspicious process: {} {}", suspect.pid, suspect.name));
        }

        Ok(())
    }

    /// The OR gate: a textbook wave signature or a soft score at the
    /// threshold both fire detection.
    fn verdict(
        shared: &EngineShared,
        event_count: usize,
        entropies: &[f64],
        report: &ScoreReport,
    ) -> bool {
        score::is_wave(event_count, entropies, &shared.cfg)
            || report.score >= shared.cfg.detection_score_threshold
    }

    fn sample_entropies(shared: &EngineShared, recent: &[PathBuf]) -> Vec<f64> {
        let count = recent.len().min(shared.cfg.sample_entropy_count);
        recent[..count]
            .iter()
            .map(|p| entropy::file_entropy(p, shared.cfg.sample_bytes))
            .collect()
    }

    fn on_detection(
        shared: &Arc<EngineShared>,
        recent: &[PathBuf],
        entropies: &[f64],
        score_report: &ScoreReport,
    ) {
        warn!(
            score = score_report.score,
            files = recent.len(),
            "ransomware-like wave detected"
        );

        let valid_files: Vec<PathBuf> = recent.iter().filter(|p| p.is_file()).cloned().collect();
        if valid_files.is_empty() {
            warn!("no valid files to quarantine");
            shared
                .ui
                .notify("Detection: No valid files found to quarantine");
            return;
        }

        let attributed: Vec<Attribution> = valid_files
            .iter()
            .map(|f| match shared.inspector.attribute(f) {
                Some(holder) => (f.clone(), Some(holder.pid), Some(holder.name)),
                None => (f.clone(), None, None),
            })
            .collect();

        let files_quarantined = if shared.cfg.auto_quarantine {
            let batch = valid_files.clone();
            let task_shared = shared.clone();
            let spawned = thread::Builder::new()
                .name("wb-quarantine".into())
                .spawn(move || Self::run_quarantine(&task_shared, &batch));
            match spawned {
                Ok(_) => QuarantineSummary::InProgress,
                Err(e) => {
                    error!(error = %e, "failed to spawn quarantine task");
                    QuarantineSummary::Disabled
                }
            }
        } else {
            info!("auto-quarantine disabled");
            shared.ui.notify(&format!(
                "DETECTION: {} suspicious file(s) detected. Auto-quarantine is DISABLED. \
                 Enable it in settings to automatically quarantine files.",
                valid_files.len()
            ));
            QuarantineSummary::Disabled
        };

        let process_killed = Self::respond_to_process(shared);

        let report = DetectionReport {
            timestamp: Utc::now().timestamp(),
            files_quarantined,
            attributed,
            process_killed: process_killed.clone(),
            sample_entropies: entropies.to_vec(),
            score_report: score_report.clone(),
        };
        shared.sink.emit(EventPayload::Detection { report });

        shared.ui.notify("=== RANSOMWARE DETECTION ===");
        shared
            .ui
            .notify(&format!("   Threat Score: {}/100", score_report.score));
        shared
            .ui
            .notify(&format!("   Suspicious Files: {}", recent.len()));
        shared.ui.notify(&format!(
            "   Auto-Quarantine: {}",
            if shared.cfg.auto_quarantine {
                "ENABLED"
            } else {
                "DISABLED"
            }
        ));
        if let Some((pid, name)) = &process_killed {
            shared
                .ui
                .notify(&format!("   Process Killed: PID {pid} ({name})"));
        }

        // safeguard the drained set, not just the existence-filtered one:
        // a file quarantine already moved shows up as failed, which still
        // records where the bytes went
        let safeguard_files = recent.to_vec();
        let task_shared = shared.clone();
        if let Err(e) = thread::Builder::new()
            .name("wb-safeguard".into())
            .spawn(move || Self::run_safeguard(&task_shared, &safeguard_files))
        {
            error!(error = %e, "failed to spawn safeguard task");
        }
    }

    /// Response stage: quarantine batch on its own thread.
    fn run_quarantine(shared: &Arc<EngineShared>, files: &[PathBuf]) {
        shared
            .ui
            .notify(&format!("Quarantining {} file(s)...", files.len()));

        let result = quarantine::quarantine_files(
            files,
            &shared.cfg.quarantine_dir,
            &shared.cfg.recovery_log_path(),
        );

        match result {
            Ok(record) => {
                let failed: Vec<_> = record
                    .moved
                    .iter()
                    .filter(|m| !m.status.is_success())
                    .collect();
                if record.successful > 0 {
                    shared.ui.notify(&format!(
                        "Quarantine successful: {} file(s) moved",
                        record.successful
                    ));
                }
                if !failed.is_empty() {
                    shared.ui.notify(&format!(
                        "Quarantine warnings: {} file(s) had issues",
                        failed.len()
                    ));
                    for item in failed.iter().take(5) {
                        let name = item
                            .original
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| item.original.display().to_string());
                        shared.ui.notify(&format!("   - {name}: {}", item.status));
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "quarantine task failed");
                shared.ui.notify(&format!("Quarantine failed: {e}"));
            }
        }
    }

    /// Response stage: principal termination with protected-process guard,
    /// then best-effort cascade to children.
    fn respond_to_process(shared: &Arc<EngineShared>) -> Option<(u32, String)> {
        let suspect = shared
            .inspector
            .enumerate_suspicious(shared.cfg.process_suspicion_score)?;

        if is_protected(suspect.pid, &suspect.name) {
            warn!(
                pid = suspect.pid,
                name = %suspect.name,
                "skipping protected process; cannot terminate safely"
            );
            shared.ui.notify(&format!(
                "Skipping critical system process PID {}",
                suspect.pid
            ));
            return None;
        }

        let outcome = shared.inspector.terminate(suspect.pid);
        let killed = outcome
            .is_kill()
            .then(|| (suspect.pid, suspect.name.clone()));

        let msg = match &outcome {
            TerminationOutcome::TerminatedGracefully => format!(
                "Stopped process gracefully: PID {} ({})",
                suspect.pid, suspect.name
            ),
            TerminationOutcome::KilledForcibly => format!(
                "Killed process forcibly: PID {} ({})",
                suspect.pid, suspect.name
            ),
            TerminationOutcome::Failed => format!(
                "Failed to stop suspicious process PID {} ({})",
                suspect.pid, suspect.name
            ),
            TerminationOutcome::Error(detail) => format!(
                "Error stopping process PID {} ({}): {detail}",
                suspect.pid, suspect.name
            ),
        };
        if outcome.is_kill() {
            warn!("{msg}");
        } else {
            error!("{msg}");
        }
        shared.ui.notify(&msg);

        shared.sink.emit(EventPayload::ProcessTermination {
            pid: suspect.pid,
            name: suspect.name.clone(),
            status: outcome.principal_label().to_string(),
            timestamp: Utc::now().timestamp(),
        });

        // cascade to children, each with its own independent outcome and
        // the guard re-checked
        for child in shared.inspector.children(suspect.pid) {
            if is_protected(child.pid, &child.name) {
                continue;
            }
            let child_outcome = shared.inspector.terminate(child.pid);
            shared.sink.emit(EventPayload::ProcessTermination {
                pid: child.pid,
                name: child.name,
                status: child_outcome.child_label(),
                timestamp: Utc::now().timestamp(),
            });
        }

        killed
    }

    /// Response stage: safeguard snapshot on its own thread.
    fn run_safeguard(shared: &Arc<EngineShared>, files: &[PathBuf]) {
        match safeguard::safeguard_copy(files, &shared.cfg.safeguards_dir()) {
            Ok(record) => {
                shared.sink.emit(EventPayload::Safeguard {
                    timestamp: record.timestamp,
                    dest: record.dest.clone(),
                    copied: record.copied.clone(),
                });
                shared.ui.notify(&format!(
                    "Safeguard completed: {} ({} files)",
                    record.dest.display(),
                    record.copied.len()
                ));
            }
            Err(e) => {
                error!(error = %e, "safeguard task failed");
                shared.ui.notify(&format!("Safeguard failed: {e}"));
            }
        }
    }
}

impl Drop for DetectionEngine {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{ChannelUi, NullUi};
    use wb_telemetry::{MemorySink, NullSink};

    fn engine_with(cfg: DetectorConfig) -> (DetectionEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = DetectionEngine::new(cfg, sink.clone(), Arc::new(NullUi))
            .unwrap()
            .with_inspector(Arc::new(crate::process::UnavailableInspector));
        (engine, sink)
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = DetectorConfig {
            check_interval: 0,
            ..Default::default()
        };
        assert!(DetectionEngine::new(cfg, Arc::new(NullSink), Arc::new(NullUi)).is_err());
    }

    #[test]
    fn check_now_with_empty_window_notifies_and_emits_nothing() {
        let (ui, rx) = ChannelUi::new(8);
        let sink = Arc::new(MemorySink::new());
        let engine = DetectionEngine::new(DetectorConfig::default(), sink.clone(), Arc::new(ui))
            .unwrap()
            .with_inspector(Arc::new(crate::process::UnavailableInspector));

        engine.check_now();
        assert_eq!(rx.recv().unwrap(), "No recent events to scan");
        assert!(sink.records().is_empty());
    }

    #[test]
    fn manual_scan_below_threshold_emits_manual_scan_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("zeros.bin");
        std::fs::write(&file, vec![0u8; 4096]).unwrap();

        let cfg = DetectorConfig {
            window_seconds: 60,
            modified_threshold: 100,
            detection_score_threshold: 90.0,
            logs_dir: dir.path().join("logs"),
            quarantine_dir: dir.path().join("q"),
            ..Default::default()
        };
        let (engine, sink) = engine_with(cfg);
        engine.record_event(&file);
        engine.check_now();

        assert_eq!(sink.count_of("manual_scan"), 1);
        assert_eq!(sink.count_of("detection"), 0);
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let (mut engine, _sink) = engine_with(DetectorConfig::default());
        assert!(!engine.is_running());
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn start_fails_without_watchable_roots() {
        let cfg = DetectorConfig {
            watch_paths: vec![PathBuf::from("/nonexistent/wavebreak-root")],
            ..Default::default()
        };
        let (mut engine, _sink) = engine_with(cfg);
        assert!(engine.start().is_err());
        assert!(!engine.is_running());
    }

    #[test]
    fn start_and_stop_transition_states() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DetectorConfig {
            watch_paths: vec![dir.path().to_path_buf()],
            logs_dir: dir.path().join("logs"),
            quarantine_dir: dir.path().join("q"),
            ..Default::default()
        };
        let (mut engine, _sink) = engine_with(cfg);
        engine.start().unwrap();
        assert!(engine.is_running());
        engine.stop();
        assert!(!engine.is_running());
    }
}
