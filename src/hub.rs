/// Broadcast hub: fan out typed stream messages to every connected observer.
///
/// Each observer is an unbounded channel; per-observer delivery order is the
/// channel's FIFO order. An observer whose receiving end is gone is pruned
/// silently and never disturbs delivery to the rest.
use crate::classify::LogEvent;
use crate::snapshot::{MessageFeed, SessionInfo};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Server→client payload envelope: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamMessage {
    Session(SessionInfo),
    Messages(MessageFeed),
    Log(LogEvent),
    Notification(Notification),
}

/// Out-of-band notice shown by the dashboard (watchdog restarts, etc.).
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: String,
}

#[derive(Default)]
pub struct Hub {
    observers: Mutex<Vec<mpsc::UnboundedSender<StreamMessage>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer. The sender is handed back so the observer's
    /// own poll task can push messages into the same FIFO channel the hub
    /// broadcasts through.
    pub fn subscribe(
        &self,
    ) -> (
        mpsc::UnboundedSender<StreamMessage>,
        mpsc::UnboundedReceiver<StreamMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(tx.clone());
        }
        (tx, rx)
    }

    /// Deliver a message to every live observer, dropping any whose channel
    /// has closed.
    pub fn deliver(&self, message: &StreamMessage) {
        let Ok(mut observers) = self.observers.lock() else {
            return;
        };
        observers.retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }
}
