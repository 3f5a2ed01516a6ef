//! The event store seam.

use crate::store::types::{EventQuery, StoreResult};
use amon_core::{Event, EventKind, Timestamp};

/// Durable, append-only event log.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and shared between the ingestion pipeline and query callers.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event and return it with its assigned id.  The event
    /// is durable once this returns `Ok`.  Concurrent appends are
    /// serialised, so ids follow call order.
    async fn append(&self, kind: EventKind, timestamp: Timestamp) -> StoreResult<Event>;

    /// Events matching `query`, ordered by timestamp then id, newest first.
    async fn query(&self, query: &EventQuery) -> StoreResult<Vec<Event>>;

    /// The most recent event, if any.
    async fn latest(&self) -> StoreResult<Option<Event>> {
        let mut events = self.query(&EventQuery::recent(1)).await?;
        Ok(events.pop())
    }
}
