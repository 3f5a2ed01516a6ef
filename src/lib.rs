//! # Alarm Monitor
//!
//! Watches a serial line for `ALARME_ON` / `ALARME_OFF`, keeps the alarm
//! in `Idle` or `Active`, presents at most one alert per activation and
//! keeps a queryable history of every transition.
//!
//! [`AlarmMonitor`] wires the pieces together:
//!
//! ```text
//!  serial port ─▶ SerialReader ─▶ decode ─▶ AlarmStateMachine ─┬─▶ EventStore
//!                                                              └─▶ AlertCoordinator
//!                         all of them ─▶ Notifier ─▶ subscribers
//! ```

pub mod config;
pub mod logging;

pub use amon_alarm::alarm::{AlarmStateMachine, AlarmStateMachineState, AlertCoordinator};
pub use amon_core::{
    AlarmState, AlarmValue, AlertHandle, Event, EventKind, Notification, Notifier, Signal, Timestamp,
};
pub use amon_serial::serial::{
    ConnectionError, ConnectionErrorKind, ConnectionResult, ReaderStatus, SerialReader, SimulatedOpener,
    SystemOpener, TransportOpener,
};
pub use amon_store::store::{EventQuery, EventStore, SqliteEventStore, StoreError, StoreErrorKind, StoreResult};
pub use config::{ConfigError, MonitorConfig};

use log::info;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// The assembled monitor.  Owns the store, the state machine, the alert
/// coordinator and the serial reader; nothing here is global.
pub struct AlarmMonitor {
    config: MonitorConfig,
    store: Arc<dyn EventStore>,
    alerts: Arc<AlertCoordinator>,
    machine: AlarmStateMachineState,
    reader: SerialReader,
    notifier: Notifier,
}

impl AlarmMonitor {
    /// Open the SQLite store named by `config` and talk to real ports.
    pub async fn open(config: MonitorConfig) -> MonitorResult<Self> {
        let store = SqliteEventStore::open(config.store_config()).await?;
        Self::with_parts(config, Arc::new(store), Arc::new(SystemOpener)).await
    }

    /// Assemble a monitor from an existing store and port opener.
    pub async fn with_parts(
        config: MonitorConfig,
        store: Arc<dyn EventStore>,
        opener: Arc<dyn TransportOpener>,
    ) -> MonitorResult<Self> {
        let notifier = Notifier::new(config.notification_capacity);
        let alerts = Arc::new(AlertCoordinator::new(notifier.clone()));

        let initial = if config.seed_state_from_store {
            let latest = store.latest().await?;
            let seeded = latest.map(|e| e.kind.resulting_state()).unwrap_or_default();
            info!("Seeding alarm state from store: {}", seeded);
            seeded
        } else {
            AlarmValue::Idle
        };
        let machine = AlarmStateMachine::with_initial(initial, store.clone(), alerts.clone(), notifier.clone())
            .into_shared();

        let reader = SerialReader::new(config.serial.reader.clone(), opener, machine.clone(), notifier.clone());

        Ok(Self {
            config,
            store,
            alerts,
            machine,
            reader,
            notifier,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // ── Connection lifecycle ────────────────────────────────────────

    pub async fn connect(&self, port: &str, baud_rate: u32) -> ConnectionResult<()> {
        self.reader.connect(port, baud_rate).await
    }

    /// Connect at the configured baud rate.
    pub async fn connect_default(&self, port: &str) -> ConnectionResult<()> {
        self.reader.connect(port, self.config.serial.baud_rate).await
    }

    pub async fn disconnect(&self) {
        self.reader.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    pub fn status(&self) -> ReaderStatus {
        self.reader.status()
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Events within the optional inclusive bounds, newest first.
    pub async fn query(
        &self,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
        limit: Option<u32>,
    ) -> StoreResult<Vec<Event>> {
        self.store.query(&EventQuery { from, to, limit }).await
    }

    pub async fn query_with(&self, query: &EventQuery) -> StoreResult<Vec<Event>> {
        self.store.query(query).await
    }

    /// The newest `historyLimit` events.
    pub async fn recent_history(&self) -> StoreResult<Vec<Event>> {
        self.store.query(&EventQuery::recent(self.config.history_limit)).await
    }

    pub async fn latest_event(&self) -> StoreResult<Option<Event>> {
        self.store.latest().await
    }

    // ── State & notifications ───────────────────────────────────────

    pub async fn state(&self) -> AlarmState {
        self.machine.lock().await.state()
    }

    pub fn active_alert(&self) -> Option<AlertHandle> {
        self.alerts.active()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }
}
