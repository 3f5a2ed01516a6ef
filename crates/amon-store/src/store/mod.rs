//! Event store: sub-modules.

pub mod types;
pub mod traits;
pub mod service;

pub use types::*;
pub use traits::EventStore;
pub use service::{SqliteEventStore, SqliteEventStoreState};
