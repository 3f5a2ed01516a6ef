//! Alert coordination.
//!
//! Owns the single presented alert.  `raise` and `clear` are idempotent,
//! so callers never need to ask whether an alert is already showing.

use amon_core::{AlertHandle, Notification, Notifier};
use log::{debug, info};
use std::sync::{Mutex, MutexGuard};

pub struct AlertCoordinator {
    active: Mutex<Option<AlertHandle>>,
    notifier: Notifier,
}

impl AlertCoordinator {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            active: Mutex::new(None),
            notifier,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<AlertHandle>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Present an alert unless one is already showing; either way return
    /// the handle of the alert that is now presented.
    pub fn raise(&self) -> AlertHandle {
        let mut slot = self.slot();
        if let Some(handle) = *slot {
            debug!("Alert {handle} already presented");
            return handle;
        }
        let handle = AlertHandle::new();
        *slot = Some(handle);
        // Published under the lock so raise/clear notifications keep order.
        self.notifier.publish(Notification::AlertRaised { handle });
        info!("Alert {handle} raised");
        handle
    }

    /// Dismiss the presented alert, if any.
    pub fn clear(&self) {
        let mut slot = self.slot();
        if let Some(handle) = slot.take() {
            self.notifier.publish(Notification::AlertCleared { handle });
            info!("Alert {handle} cleared");
        }
    }

    pub fn active(&self) -> Option<AlertHandle> {
        *self.slot()
    }

    /// Number of presented alerts: always 0 or 1.
    pub fn active_count(&self) -> usize {
        usize::from(self.slot().is_some())
    }
}
