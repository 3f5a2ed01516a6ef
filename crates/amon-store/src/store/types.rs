//! Types for the event store crate.

use amon_core::Timestamp;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreErrorKind {
    /// The database could not be opened or initialised.
    OpenFailure,
    /// An append could not be made durable.
    WriteFailure,
    /// A query could not be executed.
    ReadFailure,
    /// A stored row could not be mapped back to an event.
    CorruptRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
    pub fn open_failure(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::OpenFailure, message)
    }
    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::WriteFailure, message)
    }
    pub fn read_failure(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::ReadFailure, message)
    }
    pub fn corrupt_record(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::CorruptRecord, message)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Store config ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreMode {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub mode: StoreMode,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Pooled connections; queries use the spare ones while a write is
    /// in flight.  Memory databases always use a single connection.
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: StoreMode::File(path.into()),
            busy_timeout_ms: 5000,
            max_connections: 4,
        }
    }

    pub fn memory() -> Self {
        Self {
            mode: StoreMode::Memory,
            busy_timeout_ms: 5000,
            max_connections: 1,
        }
    }

    pub fn is_memory(&self) -> bool {
        self.mode == StoreMode::Memory
    }

    /// Human-readable location for logging.
    pub fn location(&self) -> String {
        match &self.mode {
            StoreMode::File(p) => p.display().to_string(),
            StoreMode::Memory => ":memory:".to_string(),
        }
    }
}

// ── Query ───────────────────────────────────────────────────────────

/// Filter for [`crate::store::EventStore::query`].
///
/// Bounds are inclusive and compared as text against the stored
/// timestamps, so they must use the same sortable format.  A missing bound
/// leaves that side open; results are always newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<u32>,
}

impl EventQuery {
    /// The whole log.
    pub fn all() -> Self {
        Self::default()
    }

    /// The `limit` most recent events.
    pub fn recent(limit: u32) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    pub fn between(from: impl Into<Timestamp>, to: impl Into<Timestamp>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
            limit: None,
        }
    }

    /// Every event on the days `from ..= to`, both days included.
    pub fn between_dates(from: NaiveDate, to: NaiveDate) -> Self {
        Self::between(Timestamp::start_of_day(from), Timestamp::end_of_day(to))
    }

    pub fn with_from(mut self, from: impl Into<Timestamp>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<Timestamp>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_dates_covers_whole_days() {
        let q = EventQuery::between_dates(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        );
        assert_eq!(q.from.unwrap().as_str(), "2024-03-01 00:00:00");
        assert_eq!(q.to.unwrap().as_str(), "2024-03-02 23:59:59");
        assert!(q.limit.is_none());
    }

    #[test]
    fn builders_compose() {
        let q = EventQuery::all()
            .with_from("2024-01-01 00:00:00")
            .with_limit(5);
        assert_eq!(q.from, Some(Timestamp::new("2024-01-01 00:00:00")));
        assert!(q.to.is_none());
        assert_eq!(q.limit, Some(5));
        assert_eq!(EventQuery::recent(100).limit, Some(100));
    }

    #[test]
    fn error_display_carries_kind() {
        let e = StoreError::write_failure("disk full");
        assert_eq!(e.kind, StoreErrorKind::WriteFailure);
        assert_eq!(e.to_string(), "[WriteFailure] disk full");
    }

    #[test]
    fn config_location() {
        assert_eq!(StoreConfig::memory().location(), ":memory:");
        assert!(StoreConfig::memory().is_memory());
        let cfg = StoreConfig::file("/tmp/alarm_history.db");
        assert_eq!(cfg.location(), "/tmp/alarm_history.db");
        assert_eq!(cfg.max_connections, 4);
    }
}
