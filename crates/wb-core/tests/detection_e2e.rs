//! End-to-end detection and response scenarios driven through a real
//! engine over a temp directory tree, with an in-memory event sink and a
//! channel UI sink.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::RngCore;

use wb_common::report::{QuarantineRecord, QuarantineSummary, TerminationOutcome};
use wb_common::DetectorConfig;
use wb_core::process::{ProcessInspector, ProcessRef, SuspectProcess, UnavailableInspector};
use wb_core::ui::ChannelUi;
use wb_core::DetectionEngine;
use wb_telemetry::{EventPayload, MemorySink};

/// Inspector stub with a scripted candidate and a terminate-call recorder.
#[derive(Default)]
struct ScriptedInspector {
    suspect: Option<SuspectProcess>,
    terminate_calls: Mutex<Vec<u32>>,
}

impl ScriptedInspector {
    fn with_suspect(pid: u32, name: &str, score: u64) -> Self {
        Self {
            suspect: Some(SuspectProcess {
                pid,
                name: name.to_string(),
                score,
            }),
            terminate_calls: Mutex::new(Vec::new()),
        }
    }

    fn terminate_calls(&self) -> Vec<u32> {
        self.terminate_calls.lock().unwrap().clone()
    }
}

impl ProcessInspector for ScriptedInspector {
    fn available(&self) -> bool {
        true
    }

    fn enumerate_suspicious(&self, min_score: u64) -> Option<SuspectProcess> {
        self.suspect.clone().filter(|s| s.score >= min_score)
    }

    fn attribute(&self, _path: &Path) -> Option<ProcessRef> {
        None
    }

    fn children(&self, _pid: u32) -> Vec<ProcessRef> {
        Vec::new()
    }

    fn terminate(&self, pid: u32) -> TerminationOutcome {
        self.terminate_calls.lock().unwrap().push(pid);
        TerminationOutcome::TerminatedGracefully
    }
}

struct Scenario {
    _dir: tempfile::TempDir,
    watch: PathBuf,
    quarantine: PathBuf,
    logs: PathBuf,
}

impl Scenario {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let watch = dir.path().join("watch");
        fs::create_dir_all(&watch).unwrap();
        Self {
            watch,
            quarantine: dir.path().join("quarantine"),
            logs: dir.path().join("logs"),
            _dir: dir,
        }
    }

    /// Every threshold floored so a single high-entropy file trips
    /// detection.
    fn trigger_config(&self) -> DetectorConfig {
        DetectorConfig {
            window_seconds: 60,
            check_interval: 1,
            modified_threshold: 1,
            entropy_threshold: 1.0,
            high_entropy_count: 1,
            sample_entropy_count: 5,
            detection_score_threshold: 10.0,
            process_suspicion_score: 1000,
            quarantine_dir: self.quarantine.clone(),
            auto_quarantine: true,
            logs_dir: self.logs.clone(),
            ..Default::default()
        }
    }

    fn random_files(&self, count: usize, bytes: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = self.watch.join(format!("test_file_{i}.bin"));
                let mut data = vec![0u8; bytes];
                rand::rng().fill_bytes(&mut data);
                fs::write(&path, &data).unwrap();
                path
            })
            .collect()
    }

    fn zero_files(&self, count: usize, bytes: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = self.watch.join(format!("zero_file_{i}.bin"));
                fs::write(&path, vec![0u8; bytes]).unwrap();
                path
            })
            .collect()
    }

    fn recovery_log(&self) -> PathBuf {
        self.logs.join("recovery_log.json")
    }
}

fn build_engine(
    cfg: DetectorConfig,
    inspector: Arc<dyn ProcessInspector>,
) -> (DetectionEngine, Arc<MemorySink>, Receiver<String>) {
    let sink = Arc::new(MemorySink::new());
    let (ui, rx) = ChannelUi::new(256);
    let engine = DetectionEngine::new(cfg, sink.clone(), Arc::new(ui))
        .unwrap()
        .with_inspector(inspector);
    (engine, sink, rx)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

fn parse_recovery_log(path: &Path) -> Vec<QuarantineRecord> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// A high-entropy wave triggers detection, quarantine, and the recovery
/// log.
#[test]
fn high_entropy_wave_triggers_quarantine() {
    let sc = Scenario::new();
    let files = sc.random_files(5, 8192);
    let (engine, sink, _rx) = build_engine(sc.trigger_config(), Arc::new(UnavailableInspector));

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    assert_eq!(sink.count_of("detection"), 1);
    assert_eq!(sink.count_of("manual_scan"), 1);

    // detection is emitted while the quarantine batch runs in background
    let detection = sink
        .records()
        .into_iter()
        .find_map(|r| match r.payload {
            EventPayload::Detection { report } => Some(report),
            _ => None,
        })
        .unwrap();
    assert_eq!(detection.files_quarantined, QuarantineSummary::InProgress);
    assert_eq!(detection.sample_entropies.len(), 5);
    assert!(detection.sample_entropies.iter().all(|&e| e > 7.0));

    assert!(
        wait_until(Duration::from_secs(10), || {
            files.iter().all(|f| !f.exists()) && sc.recovery_log().exists()
        }),
        "quarantine batch did not complete"
    );

    let records = parse_recovery_log(&sc.recovery_log());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].total_files, 5);
    assert_eq!(records[0].successful, 5);
    for outcome in &records[0].moved {
        assert!(outcome.status.is_success(), "status: {}", outcome.status);
        assert!(outcome.dest.as_ref().unwrap().exists());
    }

    let quarantined: Vec<_> = fs::read_dir(&sc.quarantine)
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(quarantined.len(), 5);
}

/// Low-entropy activity emits a scan summary but never a detection.
#[test]
fn low_entropy_activity_does_not_trigger() {
    let sc = Scenario::new();
    let files = sc.zero_files(5, 8192);
    // the score gate stays at the production default: an all-zero wave
    // maxes out the event-count term at 40, below the gate
    let cfg = DetectorConfig {
        detection_score_threshold: 60.0,
        ..sc.trigger_config()
    };
    let (engine, sink, _rx) = build_engine(cfg, Arc::new(UnavailableInspector));

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    assert_eq!(sink.count_of("manual_scan"), 1);
    assert_eq!(sink.count_of("detection"), 0);

    let summary = sink
        .records()
        .into_iter()
        .find_map(|r| match r.payload {
            EventPayload::ManualScan { score_report } => Some(score_report),
            _ => None,
        })
        .unwrap();
    assert!(summary.score <= 40.0);
    assert!(files.iter().all(|f| f.exists()));
}

/// Detection with auto-quarantine off leaves files and the recovery log
/// untouched and tells the operator why.
#[test]
fn disabled_auto_quarantine_reports_but_leaves_files() {
    let sc = Scenario::new();
    let files = sc.random_files(5, 8192);
    let cfg = DetectorConfig {
        auto_quarantine: false,
        ..sc.trigger_config()
    };
    let (engine, sink, rx) = build_engine(cfg, Arc::new(UnavailableInspector));

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    assert_eq!(sink.count_of("detection"), 1);
    let detection = sink
        .records()
        .into_iter()
        .find_map(|r| match r.payload {
            EventPayload::Detection { report } => Some(report),
            _ => None,
        })
        .unwrap();
    assert_eq!(detection.files_quarantined, QuarantineSummary::Disabled);

    // the safeguard still runs; wait for it so background work is done
    assert!(wait_until(Duration::from_secs(10), || {
        sink.count_of("safeguard") == 1
    }));

    assert!(!sc.recovery_log().exists());
    assert!(files.iter().all(|f| f.exists()));

    let messages: Vec<String> = rx.try_iter().collect();
    assert!(
        messages
            .iter()
            .any(|m| m.contains("Auto-quarantine is DISABLED")),
        "missing disabled notice in {messages:?}"
    );
}

/// A file that vanishes between recording and evaluation does not stall
/// the batch; the remaining files are quarantined normally.
#[test]
fn missing_file_does_not_stall_the_batch() {
    let sc = Scenario::new();
    let files = sc.random_files(5, 8192);
    let (engine, sink, _rx) = build_engine(sc.trigger_config(), Arc::new(UnavailableInspector));

    for f in &files {
        engine.record_event(f);
    }
    fs::remove_file(&files[2]).unwrap();
    engine.check_now();

    assert_eq!(sink.count_of("detection"), 1);
    assert!(
        wait_until(Duration::from_secs(10), || sc.recovery_log().exists()),
        "quarantine batch did not complete"
    );

    let records = parse_recovery_log(&sc.recovery_log());
    assert_eq!(records[0].total_files, 4);
    assert_eq!(records[0].successful, 4);
    assert!(records[0]
        .moved
        .iter()
        .all(|m| m.original != files[2]));

    // the response pipeline ran to completion
    assert!(wait_until(Duration::from_secs(10), || {
        sink.count_of("safeguard") == 1
    }));
}

/// A critical pid reported as the top candidate is never terminated and
/// never produces a termination event.
#[test]
fn critical_pid_guard_blocks_termination() {
    let sc = Scenario::new();
    let files = sc.random_files(3, 8192);
    let inspector = Arc::new(ScriptedInspector::with_suspect(4, "evil.exe", 9_999));
    let cfg = DetectorConfig {
        auto_quarantine: false,
        process_suspicion_score: 5,
        ..sc.trigger_config()
    };
    let (engine, sink, rx) = build_engine(cfg, inspector.clone());

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    assert_eq!(sink.count_of("detection"), 1);
    assert!(inspector.terminate_calls().is_empty());
    assert_eq!(sink.count_of("process_termination"), 0);

    let messages: Vec<String> = rx.try_iter().collect();
    assert!(
        messages
            .iter()
            .any(|m| m.contains("Skipping critical system process PID 4")),
        "missing skip notice in {messages:?}"
    );

    let detection = sink
        .records()
        .into_iter()
        .find_map(|r| match r.payload {
            EventPayload::Detection { report } => Some(report),
            _ => None,
        })
        .unwrap();
    assert_eq!(detection.process_killed, None);
}

/// A non-protected scripted candidate is terminated and recorded.
#[test]
fn suspicious_process_is_terminated_and_recorded() {
    let sc = Scenario::new();
    let files = sc.random_files(3, 8192);
    let inspector = Arc::new(ScriptedInspector::with_suspect(4242, "cryptor", 9_999));
    let cfg = DetectorConfig {
        auto_quarantine: false,
        process_suspicion_score: 5,
        ..sc.trigger_config()
    };
    let (engine, sink, _rx) = build_engine(cfg, inspector.clone());

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    assert_eq!(inspector.terminate_calls(), vec![4242]);
    assert_eq!(sink.count_of("process_termination"), 1);

    let detection = sink
        .records()
        .into_iter()
        .find_map(|r| match r.payload {
            EventPayload::Detection { report } => Some(report),
            _ => None,
        })
        .unwrap();
    assert_eq!(detection.process_killed, Some((4242, "cryptor".to_string())));
}

/// A textbook wave fires detection even when the score gate is
/// unreachable.
#[test]
fn wave_verdict_fires_regardless_of_score_gate() {
    let sc = Scenario::new();
    let files = sc.random_files(5, 8192);
    let cfg = DetectorConfig {
        detection_score_threshold: 100.0,
        auto_quarantine: false,
        ..sc.trigger_config()
    };
    let (engine, sink, _rx) = build_engine(cfg, Arc::new(UnavailableInspector));

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    assert_eq!(sink.count_of("detection"), 1);
}

/// A quarantine that cannot even create its directory does not stop
/// termination, the safeguard, or the detection event.
#[test]
fn quarantine_failure_is_isolated_from_other_stages() {
    let sc = Scenario::new();
    let files = sc.random_files(3, 8192);

    // shadow the quarantine root with a regular file so every attempt fails
    fs::write(&sc.quarantine, b"not a directory").unwrap();

    let inspector = Arc::new(ScriptedInspector::with_suspect(4242, "cryptor", 9_999));
    let cfg = DetectorConfig {
        process_suspicion_score: 5,
        ..sc.trigger_config()
    };
    let (engine, sink, rx) = build_engine(cfg, inspector.clone());

    for f in &files {
        engine.record_event(f);
    }
    engine.check_now();

    // detection is emitted and the kill still happened
    assert_eq!(sink.count_of("detection"), 1);
    assert_eq!(inspector.terminate_calls(), vec![4242]);

    // the safeguard still completes
    assert!(wait_until(Duration::from_secs(10), || {
        sink.count_of("safeguard") == 1
    }));

    // and the quarantine stage surfaced its failure without poisoning the run
    assert!(wait_until(Duration::from_secs(10), || {
        rx.try_iter()
            .any(|m| m.starts_with("Quarantine failed:"))
    }));
    assert!(files.iter().all(|f| f.exists()));
}

/// The scheduled evaluator drives the same pipeline as `check_now`: a real
/// watcher, a burst of writes, and a tick later the files are gone.
#[test]
fn scheduled_evaluator_detects_and_quarantines() {
    let sc = Scenario::new();
    let cfg = DetectorConfig {
        watch_paths: vec![sc.watch.clone()],
        ..sc.trigger_config()
    };
    let (mut engine, sink, _rx) = build_engine(cfg, Arc::new(UnavailableInspector));
    engine.start().unwrap();

    let files = sc.random_files(5, 8192);

    assert!(
        wait_until(Duration::from_secs(15), || sink.count_of("detection") >= 1),
        "evaluator never detected the wave"
    );
    assert!(
        wait_until(Duration::from_secs(10), || files
            .iter()
            .all(|f| !f.exists())),
        "files were not quarantined"
    );

    engine.stop();
    assert!(sink.count_of("scan_summary") >= 1);
    assert!(sink.count_of("fs_event") >= 5);
}
