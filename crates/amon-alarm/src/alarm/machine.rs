//! Alarm state machine.
//!
//! ```text
//!   Idle   + On  → Active   append AlarmActivated,   raise alert
//!   Active + On  → Active   (no event, no alert)
//!   Active + Off → Idle     append AlarmDeactivated, clear alert
//!   Idle   + Off → Idle     (no event, no alert)
//! ```
//!
//! A failed append is logged and reported, but the in-memory transition
//! and the alert still happen.

use crate::alarm::alert::AlertCoordinator;
use amon_core::{AlarmState, AlarmValue, Event, EventKind, Notification, Notifier, Signal, Timestamp};
use amon_store::store::{EventStore, StoreError};
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle used by the serial reader and the facade.
pub type AlarmStateMachineState = Arc<Mutex<AlarmStateMachine>>;

/// The transition table.  Returns the next value and the kind of event to
/// record, if the pair is an actual transition.
pub fn transition(current: AlarmValue, signal: Signal) -> (AlarmValue, Option<EventKind>) {
    match (current, signal) {
        (AlarmValue::Idle, Signal::On) => (AlarmValue::Active, Some(EventKind::AlarmActivated)),
        (AlarmValue::Active, Signal::On) => (AlarmValue::Active, None),
        (AlarmValue::Active, Signal::Off) => (AlarmValue::Idle, Some(EventKind::AlarmDeactivated)),
        (AlarmValue::Idle, Signal::Off) => (AlarmValue::Idle, None),
    }
}

/// What applying one signal did.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub previous: AlarmValue,
    pub current: AlarmValue,
    /// The persisted event, when the transition was recorded.
    pub event: Option<Event>,
    /// Set when the transition happened but could not be persisted.
    pub store_error: Option<StoreError>,
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

pub struct AlarmStateMachine {
    state: AlarmState,
    store: Arc<dyn EventStore>,
    alerts: Arc<AlertCoordinator>,
    notifier: Notifier,
}

impl AlarmStateMachine {
    /// A machine starting `Idle`.
    pub fn new(store: Arc<dyn EventStore>, alerts: Arc<AlertCoordinator>, notifier: Notifier) -> Self {
        Self {
            state: AlarmState::default(),
            store,
            alerts,
            notifier,
        }
    }

    /// A machine starting in `initial`.  Starting `Active` presents the
    /// alert straight away so state and alert agree.
    pub fn with_initial(
        initial: AlarmValue,
        store: Arc<dyn EventStore>,
        alerts: Arc<AlertCoordinator>,
        notifier: Notifier,
    ) -> Self {
        let mut machine = Self::new(store, alerts, notifier);
        if initial == AlarmValue::Active {
            machine.state = AlarmState {
                value: AlarmValue::Active,
                active_alert: Some(machine.alerts.raise()),
            };
            info!("Alarm state seeded as Active");
        }
        machine
    }

    pub fn into_shared(self) -> AlarmStateMachineState {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Apply one decoded signal recognised at `timestamp`.
    pub async fn apply(&mut self, signal: Signal, timestamp: Timestamp) -> TransitionOutcome {
        let previous = self.state.value;
        let (next, kind) = transition(previous, signal);

        let Some(kind) = kind else {
            debug!("Signal {signal:?} ignored while {previous}");
            return TransitionOutcome {
                previous,
                current: previous,
                event: None,
                store_error: None,
            };
        };

        let (event, store_error) = match self.store.append(kind, timestamp.clone()).await {
            Ok(event) => (Some(event), None),
            Err(e) => {
                error!("Alarm {kind} at {timestamp} not persisted: {e}");
                self.notifier.publish(Notification::StoreDegraded {
                    message: e.to_string(),
                });
                (None, Some(e))
            }
        };

        self.state.value = next;
        self.notifier.publish(Notification::StateChanged {
            new_state: next,
            latest_event: event.clone(),
        });

        match next {
            AlarmValue::Active => self.state.active_alert = Some(self.alerts.raise()),
            AlarmValue::Idle => {
                self.alerts.clear();
                self.state.active_alert = None;
            }
        }
        info!("Alarm {previous} → {next} at {timestamp}");

        TransitionOutcome {
            previous,
            current: next,
            event,
            store_error,
        }
    }
}
