//! SQLite-backed event store.

use crate::store::traits::EventStore;
use crate::store::types::*;
use amon_core::{Event, EventKind, Timestamp};
use log::{debug, error, info, warn};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub type SqliteEventStoreState = Arc<SqliteEventStore>;

const CREATE_EVENTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL
)";

const CREATE_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events (timestamp, id)";

pub struct SqliteEventStore {
    pool: SqlitePool,
    config: StoreConfig,
    /// Serialises appends so ids are handed out in call order.
    write_lock: Mutex<()>,
}

impl SqliteEventStore {
    /// Open (creating if missing) the store described by `config`.  Opening
    /// an already-initialised database is safe.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let options = match &config.mode {
            StoreMode::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StoreError::open_failure(format!(
                            "cannot create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Full)
            }
            StoreMode::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::open_failure(format!("SQLite options: {e}")))?,
        }
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        // A memory database lives and dies with its one connection.
        let max_connections = if config.is_memory() { 1 } else { config.max_connections.max(1) };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::open_failure(format!("SQLite connect {}: {e}", config.location()))
            })?;

        for ddl in [CREATE_EVENTS_TABLE, CREATE_TIMESTAMP_INDEX] {
            sqlx::query(ddl).execute(&pool).await.map_err(|e| {
                StoreError::open_failure(format!("schema init {}: {e}", config.location()))
            })?;
        }

        let store = Self {
            pool,
            config,
            write_lock: Mutex::new(()),
        };
        store.report_unknown_kinds().await;
        info!("Event store opened at {}", store.config.location());
        Ok(store)
    }

    /// Older databases may hold rows in another vocabulary.  Queries skip
    /// them; this only says how many there are.
    async fn report_unknown_kinds(&self) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM events WHERE event_type NOT IN (");
        push_known_kinds(&mut qb);
        let unknown = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .and_then(|row| row.try_get::<i64, _>(0));
        match unknown {
            Ok(0) => {}
            Ok(n) => warn!(
                "{} event(s) in {} have an unknown kind and are ignored",
                n,
                self.config.location()
            ),
            Err(e) => warn!("Could not check event kinds in {}: {e}", self.config.location()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of stored events.
    pub async fn count(&self) -> StoreResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::read_failure(format!("count events: {e}")))?;
        Ok(n.max(0) as u64)
    }

    /// Close the pool.  Later appends fail with `WriteFailure`.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Event store at {} closed", self.config.location());
    }

    fn event_from_row(row: &SqliteRow) -> StoreResult<Event> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::corrupt_record(format!("id column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| StoreError::corrupt_record(format!("event {id} timestamp: {e}")))?;
        let kind: String = row
            .try_get("event_type")
            .map_err(|e| StoreError::corrupt_record(format!("event {id} kind: {e}")))?;
        let kind = kind
            .parse::<EventKind>()
            .map_err(|e| StoreError::corrupt_record(format!("event {id}: {e}")))?;
        Ok(Event {
            id,
            timestamp: Timestamp::new(timestamp),
            kind,
        })
    }
}

/// Binds the known event kinds and closes an open `IN (` list.
fn push_known_kinds(qb: &mut QueryBuilder<'_, Sqlite>) {
    let mut kinds = qb.separated(", ");
    for kind in [EventKind::AlarmActivated, EventKind::AlarmDeactivated] {
        kinds.push_bind(kind.as_str());
    }
    kinds.push_unseparated(")");
}

#[async_trait::async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, kind: EventKind, timestamp: Timestamp) -> StoreResult<Event> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("INSERT INTO events (timestamp, event_type) VALUES (?, ?)")
            .bind(timestamp.as_str())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to record {kind} at {timestamp}: {e}");
                StoreError::write_failure(format!("insert {kind}: {e}"))
            })?;

        let event = Event {
            id: result.last_insert_rowid(),
            timestamp,
            kind,
        };
        info!("Recorded event #{} {} at {}", event.id, event.kind, event.timestamp);
        Ok(event)
    }

    /// Rows whose kind is outside the vocabulary are skipped, so limits
    /// count only readable events.
    async fn query(&self, query: &EventQuery) -> StoreResult<Vec<Event>> {
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, timestamp, event_type FROM events");
        qb.push(" WHERE event_type IN (");
        push_known_kinds(&mut qb);
        if let Some(from) = &query.from {
            qb.push(" AND timestamp >= ").push_bind(from.as_str().to_owned());
        }
        if let Some(to) = &query.to {
            qb.push(" AND timestamp <= ").push_bind(to.as_str().to_owned());
        }
        qb.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<SqliteRow> = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::read_failure(format!("query events: {e}")))?;

        debug!("Event query {:?} returned {} rows", query, rows.len());
        rows.iter().map(Self::event_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteEventStore {
        SqliteEventStore::open(StoreConfig::memory()).await.unwrap()
    }

    async fn seed(store: &SqliteEventStore, rows: &[(EventKind, &str)]) -> Vec<Event> {
        let mut out = Vec::new();
        for (kind, ts) in rows {
            out.push(store.append(*kind, Timestamp::new(*ts)).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = memory_store().await;
        let a = store
            .append(EventKind::AlarmActivated, Timestamp::new("2024-01-01 10:00:00"))
            .await
            .unwrap();
        let b = store
            .append(EventKind::AlarmDeactivated, Timestamp::new("2024-01-01 10:05:00"))
            .await
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.kind, EventKind::AlarmActivated);
        assert_eq!(b.timestamp.as_str(), "2024-01-01 10:05:00");
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unbounded_query_returns_everything_newest_first() {
        let store = memory_store().await;
        let stored = seed(
            &store,
            &[
                (EventKind::AlarmActivated, "2024-01-01 10:00:00"),
                (EventKind::AlarmDeactivated, "2024-01-01 10:01:00"),
                (EventKind::AlarmActivated, "2024-01-02 09:00:00"),
                (EventKind::AlarmDeactivated, "2024-01-03 18:30:00"),
            ],
        )
        .await;

        let events = store.query(&EventQuery::all()).await.unwrap();
        let expected: Vec<Event> = stored.into_iter().rev().collect();
        assert_eq!(events, expected);
    }

    #[tokio::test]
    async fn range_is_inclusive_on_both_ends() {
        let store = memory_store().await;
        seed(
            &store,
            &[
                (EventKind::AlarmActivated, "2024-05-01 08:00:00"),
                (EventKind::AlarmDeactivated, "2024-05-02 08:00:00"),
                (EventKind::AlarmActivated, "2024-05-03 08:00:00"),
            ],
        )
        .await;

        let events = store
            .query(&EventQuery::between("2024-05-01 08:00:00", "2024-05-02 08:00:00"))
            .await
            .unwrap();
        let stamps: Vec<&str> = events.iter().map(|e| e.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["2024-05-02 08:00:00", "2024-05-01 08:00:00"]);
    }

    #[tokio::test]
    async fn single_bound_is_applied_alone() {
        let store = memory_store().await;
        seed(
            &store,
            &[
                (EventKind::AlarmActivated, "2024-05-01 08:00:00"),
                (EventKind::AlarmDeactivated, "2024-05-02 08:00:00"),
                (EventKind::AlarmActivated, "2024-05-03 08:00:00"),
            ],
        )
        .await;

        let after = store
            .query(&EventQuery::all().with_from("2024-05-02 00:00:00"))
            .await
            .unwrap();
        assert_eq!(after.len(), 2);

        let before = store
            .query(&EventQuery::all().with_to("2024-05-01 23:59:59"))
            .await
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].timestamp.as_str(), "2024-05-01 08:00:00");
    }

    #[tokio::test]
    async fn equal_timestamps_break_ties_by_id() {
        let store = memory_store().await;
        let stored = seed(
            &store,
            &[
                (EventKind::AlarmActivated, "2024-06-01 12:00:00"),
                (EventKind::AlarmDeactivated, "2024-06-01 12:00:00"),
            ],
        )
        .await;
        let events = store.query(&EventQuery::all()).await.unwrap();
        assert_eq!(events[0].id, stored[1].id);
        assert_eq!(events[1].id, stored[0].id);
    }

    #[tokio::test]
    async fn limit_truncates_after_ordering() {
        let store = memory_store().await;
        seed(
            &store,
            &[
                (EventKind::AlarmActivated, "2024-01-01 00:00:01"),
                (EventKind::AlarmDeactivated, "2024-01-01 00:00:02"),
                (EventKind::AlarmActivated, "2024-01-01 00:00:03"),
            ],
        )
        .await;

        let events = store.query(&EventQuery::recent(2)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp.as_str(), "2024-01-01 00:00:03");

        assert!(store.query(&EventQuery::recent(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_returns_newest_event() {
        let store = memory_store().await;
        assert!(store.latest().await.unwrap().is_none());
        seed(
            &store,
            &[
                (EventKind::AlarmActivated, "2024-01-01 00:00:01"),
                (EventKind::AlarmDeactivated, "2024-01-01 00:00:02"),
            ],
        )
        .await;
        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.kind, EventKind::AlarmDeactivated);
    }

    #[tokio::test]
    async fn concurrent_appends_get_unique_ids() {
        let store = Arc::new(memory_store().await);
        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let kind = if i % 2 == 0 {
                    EventKind::AlarmActivated
                } else {
                    EventKind::AlarmDeactivated
                };
                store
                    .append(kind, Timestamp::new(format!("2024-01-01 00:00:{i:02}")))
                    .await
                    .unwrap()
            }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert_eq!(store.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn append_after_close_is_write_failure() {
        let store = memory_store().await;
        store.close().await;
        let err = store
            .append(EventKind::AlarmActivated, Timestamp::new("2024-01-01 00:00:00"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::WriteFailure);
    }

    #[tokio::test]
    async fn rows_with_unknown_kind_are_skipped() {
        let store = memory_store().await;
        let valid = seed(&store, &[(EventKind::AlarmActivated, "2024-01-01 00:00:00")]).await;
        sqlx::query("INSERT INTO events (timestamp, event_type) VALUES (?, ?)")
            .bind("2024-01-01 00:00:05")
            .bind("Alarme Ativado")
            .execute(&store.pool)
            .await
            .unwrap();

        let all = store.query(&EventQuery::all()).await.unwrap();
        assert_eq!(all, valid);
        // The newest row is the foreign one; limits and latest ignore it.
        assert_eq!(store.query(&EventQuery::recent(1)).await.unwrap(), valid);
        assert_eq!(store.latest().await.unwrap(), valid.first().cloned());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn file_store_reopens_idempotently_and_keeps_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alarm_history.db");

        let first = SqliteEventStore::open(StoreConfig::file(&path)).await.unwrap();
        let stored = first
            .append(EventKind::AlarmActivated, Timestamp::new("2024-07-01 07:00:00"))
            .await
            .unwrap();
        first.close().await;

        let second = SqliteEventStore::open(StoreConfig::file(&path)).await.unwrap();
        let events = second.query(&EventQuery::all()).await.unwrap();
        assert_eq!(events, vec![stored.clone()]);

        let next = second
            .append(EventKind::AlarmDeactivated, Timestamp::new("2024-07-01 07:10:00"))
            .await
            .unwrap();
        assert!(next.id > stored.id);
        second.close().await;
    }
}
