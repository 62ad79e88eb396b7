//! Sliding event window.
//!
//! The aggregator owns the time-bounded window of filesystem events and is
//! the single point of UI rate limiting: no matter how fast events arrive,
//! at most one coalesced summary string per second reaches the UI sink.
//!
//! Memory footprint is bounded in practice by event rate × `window_seconds`
//! (a few hundred bytes per event); no explicit cap is imposed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use wb_telemetry::{EventPayload, EventSink};

use crate::ui::UiSink;

/// A single filesystem notification held in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Seconds since the Unix epoch at arrival.
    pub timestamp: i64,
    pub path: PathBuf,
}

/// Minimum interval between coalesced UI summaries.
const UI_PUSH_INTERVAL: Duration = Duration::from_secs(1);

struct WindowState {
    events: VecDeque<FileEvent>,
    ui_pending: u64,
    last_ui_push: Option<Instant>,
}

/// Accepts filesystem event notifications and serves time-bounded snapshots
/// to the engine. All window access (append, prune, UI counter) happens
/// under one mutex.
pub struct EventAggregator {
    window_seconds: i64,
    state: Mutex<WindowState>,
    sink: Arc<dyn EventSink>,
    ui: Arc<dyn UiSink>,
}

impl EventAggregator {
    pub fn new(window_seconds: u64, sink: Arc<dyn EventSink>, ui: Arc<dyn UiSink>) -> Self {
        Self {
            window_seconds: window_seconds as i64,
            state: Mutex::new(WindowState {
                events: VecDeque::new(),
                ui_pending: 0,
                last_ui_push: None,
            }),
            sink,
            ui,
        }
    }

    /// Record one event. Emits an `fs_event` structured event and, at most
    /// once per second, a coalesced summary to the UI.
    pub fn record(&self, path: &Path) {
        let timestamp = Utc::now().timestamp();
        let mut push_summary = None;

        {
            let mut state = match self.state.lock() {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.events.push_back(FileEvent {
                timestamp,
                path: path.to_path_buf(),
            });
            state.ui_pending += 1;

            let now = Instant::now();
            let due = state
                .last_ui_push
                .map_or(true, |last| now.duration_since(last) >= UI_PUSH_INTERVAL);
            if due {
                push_summary = Some(state.ui_pending);
                state.ui_pending = 0;
                state.last_ui_push = Some(now);
            }
        }

        debug!(path = %path.display(), "recorded filesystem event");
        self.sink.emit(EventPayload::FsEvent {
            path: path.to_path_buf(),
        });

        if let Some(count) = push_summary {
            self.ui
                .notify(&format!("Events observed: +{count} in last second"));
        }
    }

    /// Atomically prune everything older than the window and return the
    /// retained paths in arrival order. Events stay in the window until they
    /// age out, so consecutive evaluations see a file that keeps being
    /// rewritten.
    pub fn drain_recent(&self) -> Vec<PathBuf> {
        let cutoff = Utc::now().timestamp() - self.window_seconds;
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.events.retain(|e| e.timestamp >= cutoff);
        state.events.iter().map(|e| e.path.clone()).collect()
    }

    /// Current window size, for diagnostics.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
