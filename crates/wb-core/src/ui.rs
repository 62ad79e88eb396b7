//! User-facing notification sink.
//!
//! The engine treats the UI as an opaque sink that may be invoked from any
//! of its threads; marshaling onto a UI event loop is the sink's concern.
//! Notification is fire-and-forget; the engine never awaits a consumer.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError};

/// Consumer of human-readable engine notifications.
pub trait UiSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Sink that discards everything. Used by headless deployments and tests
/// that only assert on structured events.
#[derive(Debug, Default)]
pub struct NullUi;

impl UiSink for NullUi {
    fn notify(&self, _message: &str) {}
}

/// Wraps an arbitrary callback function.
pub struct CallbackUi {
    callback: Box<dyn Fn(&str) + Send + Sync>,
}

impl CallbackUi {
    pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl UiSink for CallbackUi {
    fn notify(&self, message: &str) {
        (self.callback)(message);
    }
}

/// Bounded channel sink for frontends that consume notifications on their
/// own thread. When the consumer falls behind, messages are dropped rather
/// than blocking engine threads.
pub struct ChannelUi {
    tx: SyncSender<String>,
}

impl ChannelUi {
    /// Create a sink and its receiving end with the given queue capacity.
    pub fn new(capacity: usize) -> (Self, Receiver<String>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(capacity);
        (Self { tx }, rx)
    }
}

impl UiSink for ChannelUi {
    fn notify(&self, message: &str) {
        match self.tx.try_send(message.to_string()) {
            Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
