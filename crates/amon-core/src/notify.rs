//! Notifications toward the presentation layer.
//!
//! The core never calls back into the UI directly.  Every state change,
//! alert and connection status update is published on a broadcast channel;
//! the UI subscribes from whatever execution context it runs on.

use crate::types::{AlarmValue, AlertHandle, Event};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A single update published by the alarm pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// The alarm changed state.  `latest_event` is `None` only when the
    /// event could not be persisted.
    #[serde(rename_all = "camelCase")]
    StateChanged {
        new_state: AlarmValue,
        latest_event: Option<Event>,
    },
    /// An alert must be presented.
    AlertRaised { handle: AlertHandle },
    /// The alert must be dismissed.
    AlertCleared { handle: AlertHandle },
    /// A serial connection was opened.
    Connected { port: String, baud: u32 },
    /// The serial connection was closed on request.
    Disconnected { port: String },
    /// The serial connection failed underneath the reader; polling stopped.
    ConnectionLost { port: String, reason: String },
    /// An event could not be persisted; alarm tracking continues.
    StoreDegraded { message: String },
}

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// missing notifications.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish to every current subscriber.  Having no subscriber is not an
    /// error.
    pub fn publish(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            log::trace!("notification dropped: no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}
