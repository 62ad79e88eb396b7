//! Structured event emission for Wavebreak.
//!
//! Every component reports through an [`EventSink`]; the production sink is
//! the append-only JSONL log in [`writer`], tests use [`MemorySink`], and
//! [`FanoutSink`] composes several consumers. Emission is fire-and-forget:
//! a sink failure is the sink's problem, never the emitter's.

pub mod schema;
pub mod writer;

use std::sync::{Arc, Mutex};

pub use schema::{EventPayload, EventRecord};
pub use writer::JsonlEventLog;

/// Consumer of structured events. Implementations must tolerate emission
/// from any thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, payload: EventPayload);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _payload: EventPayload) {}
}

/// In-memory sink for tests and inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<EventRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in order.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Discriminators of everything emitted so far, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.records()
            .iter()
            .map(|r| r.payload.kind())
            .collect()
    }

    /// Count of events with the given discriminator.
    pub fn count_of(&self, kind: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.payload.kind() == kind)
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, payload: EventPayload) {
        if let Ok(mut records) = self.records.lock() {
            records.push(EventRecord::new(payload));
        }
    }
}

/// Forwards every event to multiple sinks.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, payload: EventPayload) {
        for sink in &self.sinks {
            sink.emit(payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fs_event(path: &str) -> EventPayload {
        EventPayload::FsEvent {
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn memory_sink_preserves_order() {
        let sink = MemorySink::new();
        sink.emit(fs_event("/a"));
        sink.emit(fs_event("/b"));
        assert_eq!(sink.kinds(), vec!["fs_event", "fs_event"]);
        assert_eq!(sink.count_of("fs_event"), 2);
        assert_eq!(sink.count_of("detection"), 0);
    }

    #[test]
    fn fanout_reaches_all_sinks() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone()]);
        fanout.emit(fs_event("/a"));
        assert_eq!(a.records().len(), 1);
        assert_eq!(b.records().len(), 1);
    }

    #[test]
    fn null_sink_accepts_everything() {
        NullSink.emit(fs_event("/dev/null"));
    }
}
