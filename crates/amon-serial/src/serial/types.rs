//! Types for the serial reader crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Reader configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderConfig {
    /// Delay between poll cycles.
    pub poll_interval_ms: u64,
    /// Upper bound on a single blocking read.
    pub read_timeout_ms: u64,
    /// Lines longer than this are discarded.
    pub max_line_length: usize,
    /// Bytes requested from the port per read.
    pub read_chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            read_timeout_ms: 1000,
            max_line_length: 4096,
            read_chunk_size: 1024,
        }
    }
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionErrorKind {
    /// `connect` was called while a connection is open.
    AlreadyOpen,
    /// The port could not be opened.
    OpenFailure,
    /// An open connection failed mid-poll.  Polling has stopped.
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub port: String,
    pub message: String,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.port, self.message)
    }
}

impl std::error::Error for ConnectionError {}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, port: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            port: port.into(),
            message: message.into(),
        }
    }
    pub fn already_open(port: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::AlreadyOpen, port, "a connection is already open")
    }
    pub fn open_failure(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::OpenFailure, port, message)
    }
    pub fn lost(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Lost, port, message)
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Reader status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ReaderStatus {
    #[default]
    Disconnected,
    Connected { port: String, baud: u32 },
    Lost { port: String, reason: String },
}

impl ReaderStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ReaderStatus::Connected { .. })
    }

    pub fn port(&self) -> Option<&str> {
        match self {
            ReaderStatus::Disconnected => None,
            ReaderStatus::Connected { port, .. } | ReaderStatus::Lost { port, .. } => Some(port),
        }
    }

    /// The loss as an error, when the last connection was lost.
    pub fn lost_error(&self) -> Option<ConnectionError> {
        match self {
            ReaderStatus::Lost { port, reason } => Some(ConnectionError::lost(port.clone(), reason.clone())),
            _ => None,
        }
    }
}
