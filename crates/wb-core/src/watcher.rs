//! Recursive filesystem watcher.
//!
//! A thin wrapper around `notify` that forwards create/modify/move
//! notifications for regular files into the [`EventAggregator`]. Raw
//! backend events arrive on an mpsc channel consumed by a dedicated
//! dispatcher thread, so backend callbacks never touch the window mutex
//! directly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use wb_common::{Error, Result};

use crate::window::EventAggregator;

/// Bound on how long `stop` waits for the dispatcher to quiesce.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

const DISPATCH_POLL: Duration = Duration::from_millis(200);

/// Owns the backend watcher and its dispatcher thread.
pub struct FsWatcher {
    backend: Option<RecommendedWatcher>,
    dispatcher: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
}

impl FsWatcher {
    /// Subscribe recursively to every existing root and start dispatching
    /// into the aggregator.
    ///
    /// Roots that do not exist are skipped with a log line. Failing to
    /// subscribe to an existing root is a startup error, as is ending up
    /// with nothing watched at all.
    pub fn start(roots: &[PathBuf], aggregator: Arc<EventAggregator>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut backend = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| Error::WatchStart(e.to_string()))?;

        let mut watched = 0usize;
        for root in roots {
            if !root.exists() {
                info!(path = %root.display(), "skipping missing watch path");
                continue;
            }
            backend
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::WatchStart(format!("{}: {e}", root.display())))?;
            info!(path = %root.display(), "scheduled recursive watch");
            watched += 1;
        }
        if watched == 0 {
            return Err(Error::NoWatchableRoots);
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let dispatcher = {
            let stop_flag = stop_flag.clone();
            thread::Builder::new()
                .name("wb-fswatch".into())
                .spawn(move || Self::dispatch_loop(rx, aggregator, stop_flag))?
        };

        Ok(Self {
            backend: Some(backend),
            dispatcher: Some(dispatcher),
            stop_flag,
        })
    }

    fn dispatch_loop(
        rx: mpsc::Receiver<notify::Result<Event>>,
        aggregator: Arc<EventAggregator>,
        stop_flag: Arc<AtomicBool>,
    ) {
        while !stop_flag.load(Ordering::Relaxed) {
            match rx.recv_timeout(DISPATCH_POLL) {
                Ok(Ok(event)) => Self::dispatch(&aggregator, &event),
                Ok(Err(e)) => warn!(error = %e, "watch backend error"),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn dispatch(aggregator: &EventAggregator, event: &Event) {
        for path in relevant_paths(event) {
            // directory events carry no encryption signal
            if path.is_dir() {
                continue;
            }
            aggregator.record(path);
        }
    }

    /// Stop dispatching. Blocks until the dispatcher has quiesced, bounded
    /// by [`STOP_TIMEOUT`], after which the thread is detached.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        // dropping the backend tears down the OS subscription and closes
        // the channel, which also unblocks the dispatcher
        self.backend.take();

        if let Some(handle) = self.dispatcher.take() {
            let deadline = Instant::now() + STOP_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(25));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("watch dispatcher did not quiesce in time; detaching");
            }
        }
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Paths of an event that should feed the window.
///
/// Create and modify use the affected paths; a move reports its destination
/// (the new location is what gets scored). Everything else, removals,
/// reads, and the source half of a rename, is noise here.
fn relevant_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths are [source, destination]
            event.paths.get(1..).unwrap_or(&[])
        }
        EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::NullUi;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use wb_telemetry::NullSink;

    fn event(kind: EventKind, paths: Vec<&str>) -> Event {
        let mut e = Event::new(kind);
        e.paths = paths.into_iter().map(PathBuf::from).collect();
        e
    }

    #[test]
    fn create_and_modify_use_affected_paths() {
        let e = event(EventKind::Create(CreateKind::File), vec!["/w/a"]);
        assert_eq!(relevant_paths(&e), &[PathBuf::from("/w/a")]);

        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            vec!["/w/a"],
        );
        assert_eq!(relevant_paths(&e), &[PathBuf::from("/w/a")]);
    }

    #[test]
    fn rename_uses_destination_only() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec!["/w/old", "/w/new"],
        );
        assert_eq!(relevant_paths(&e), &[PathBuf::from("/w/new")]);

        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            vec!["/w/old"],
        );
        assert!(relevant_paths(&e).is_empty());

        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            vec!["/w/new"],
        );
        assert_eq!(relevant_paths(&e), &[PathBuf::from("/w/new")]);
    }

    #[test]
    fn removals_and_access_are_ignored() {
        let e = event(EventKind::Remove(RemoveKind::File), vec!["/w/a"]);
        assert!(relevant_paths(&e).is_empty());

        let e = event(EventKind::Access(notify::event::AccessKind::Any), vec!["/w/a"]);
        assert!(relevant_paths(&e).is_empty());
    }

    fn test_aggregator() -> Arc<EventAggregator> {
        Arc::new(EventAggregator::new(
            60,
            Arc::new(NullSink),
            Arc::new(NullUi),
        ))
    }

    #[test]
    fn missing_roots_alone_refuse_to_start() {
        let agg = test_aggregator();
        let err = FsWatcher::start(&[PathBuf::from("/nonexistent/wavebreak-root")], agg)
            .err()
            .expect("should not start with zero watchable roots");
        assert!(matches!(err, Error::NoWatchableRoots));
    }

    #[test]
    fn missing_roots_are_skipped_when_another_exists() {
        let dir = tempfile::tempdir().unwrap();
        let agg = test_aggregator();
        let roots = vec![
            PathBuf::from("/nonexistent/wavebreak-root"),
            dir.path().to_path_buf(),
        ];
        let mut watcher = FsWatcher::start(&roots, agg).unwrap();
        watcher.stop();
    }

    #[test]
    fn watcher_feeds_aggregator_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let agg = test_aggregator();
        let mut watcher = FsWatcher::start(&[dir.path().to_path_buf()], agg.clone()).unwrap();

        fs::write(dir.path().join("victim.txt"), b"plaintext").unwrap();

        // notification delivery is asynchronous
        let deadline = Instant::now() + Duration::from_secs(5);
        while agg.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        watcher.stop();

        let recent = agg.drain_recent();
        assert!(
            recent.iter().any(|p| p.ends_with("victim.txt")),
            "expected victim.txt in {recent:?}"
        );
    }

    #[test]
    fn directory_creation_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let agg = test_aggregator();
        let mut watcher = FsWatcher::start(&[dir.path().to_path_buf()], agg.clone()).unwrap();

        fs::create_dir(dir.path().join("subdir")).unwrap();
        thread::sleep(Duration::from_millis(500));
        watcher.stop();

        let recent = agg.drain_recent();
        assert!(
            !recent.iter().any(|p| p.ends_with("subdir")),
            "directory leaked into the window: {recent:?}"
        );
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher =
            FsWatcher::start(&[dir.path().to_path_buf()], test_aggregator()).unwrap();
        watcher.stop();
        watcher.stop();
    }
}
