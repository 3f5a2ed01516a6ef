//! Shared types for the alarm monitor.
//!
//! Covers the persisted event record, the sortable timestamp text it is
//! keyed on, the decoded wire signal, and the in-memory alarm state.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Timestamp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Storage format for event timestamps.  Lexicographic order of the
/// formatted text equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sortable timestamp text (`YYYY-MM-DD HH:MM:SS`, local wall-clock time).
///
/// Bounds supplied by callers are kept verbatim and compared as text, so a
/// `Timestamp` built with [`Timestamp::new`] is not validated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Wrap caller-supplied text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The current local time.
    pub fn now() -> Self {
        Self::from_naive(Local::now().naive_local())
    }

    pub fn from_naive(at: NaiveDateTime) -> Self {
        Self(at.format(TIMESTAMP_FORMAT).to_string())
    }

    /// First second of `date`.
    pub fn start_of_day(date: NaiveDate) -> Self {
        Self(format!("{} 00:00:00", date.format("%Y-%m-%d")))
    }

    /// Last second of `date`.
    pub fn end_of_day(date: NaiveDate) -> Self {
        Self(format!("{} 23:59:59", date.format("%Y-%m-%d")))
    }

    /// Parse the text back into a date-time, if it is in storage format.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, TIMESTAMP_FORMAT).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Timestamp {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind of a persisted event.  The `Display` form is the stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AlarmActivated,
    AlarmDeactivated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlarmActivated => "AlarmActivated",
            Self::AlarmDeactivated => "AlarmDeactivated",
        }
    }

    /// The alarm state an event of this kind leaves behind.
    pub fn resulting_state(&self) -> AlarmValue {
        match self {
            Self::AlarmActivated => AlarmValue::Active,
            Self::AlarmDeactivated => AlarmValue::Idle,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when stored text is not a known [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AlarmActivated" => Ok(Self::AlarmActivated),
            "AlarmDeactivated" => Ok(Self::AlarmDeactivated),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// An immutable, stored alarm transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Store-assigned, monotonic identifier.
    pub id: i64,
    /// When the transition was recognised (not device time).
    pub timestamp: Timestamp,
    pub kind: EventKind,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Signals & alarm state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A decoded wire token.  Produced by the decoder, consumed once by the
/// state machine, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    On,
    Off,
}

/// Current value of the alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlarmValue {
    #[default]
    Idle,
    Active,
}

impl AlarmValue {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Active => "Active",
        }
    }
}

impl fmt::Display for AlarmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque reference to a presented alert.  Holding one does not keep the
/// alert alive; the alert coordinator owns its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertHandle(uuid::Uuid);

impl AlertHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn id(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for AlertHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{}", self.0)
    }
}

/// In-memory alarm state held by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmState {
    pub value: AlarmValue,
    pub active_alert: Option<AlertHandle>,
}

impl AlarmState {
    pub fn is_active(&self) -> bool {
        self.value == AlarmValue::Active
    }
}
