//! The durable event queue.
//!
//! Every operation takes the connection lock exactly once, so a count
//! returned by [`EventStore::append`] or [`EventStore::delete_through`] is
//! consistent with the rows visible to the next read.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument, warn};

use courier_core::{Batch, EventRecord, RecordId};

use crate::database::Database;
use crate::errors::{Result, StoreError};

/// Ordered local queue of serialized events with a byte-size ceiling.
#[derive(Clone)]
pub struct EventStore {
    db: Database,
    max_cache_size: u64,
}

impl EventStore {
    /// Wrap a database with the given footprint ceiling in bytes.
    ///
    /// Floors are a settings concern; the store enforces exactly what it is
    /// given.
    pub fn new(db: Database, max_cache_size: u64) -> Self {
        Self { db, max_cache_size }
    }

    /// Configured ceiling in bytes.
    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    /// Insert one record and return the number of queued rows afterwards.
    ///
    /// Fails with [`StoreError::CapacityExceeded`] (nothing inserted) when
    /// the current footprint plus the payload would pass the ceiling.
    #[instrument(skip_all, fields(bytes = payload.len()))]
    pub fn append(&self, payload: &str) -> Result<u64> {
        let incoming = payload.len() as u64;
        self.db.with_conn(|conn| {
            let footprint = footprint(conn)?;
            if footprint.saturating_add(incoming) > self.max_cache_size {
                warn!(footprint, incoming, limit = self.max_cache_size, "event store full");
                return Err(StoreError::CapacityExceeded {
                    footprint,
                    incoming,
                    limit: self.max_cache_size,
                });
            }

            let _ = conn.execute(
                "INSERT INTO events (data, created_at) VALUES (?1, ?2)",
                params![payload, Utc::now().timestamp_millis()],
            )?;
            count(conn)
        })
    }

    /// Up to `limit` oldest records, or `None` when the queue is empty.
    #[instrument(skip(self))]
    pub fn read_oldest(&self, limit: usize) -> Result<Option<Batch>> {
        if limit == 0 {
            return Ok(None);
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT _id, data, created_at FROM events ORDER BY _id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                Ok(EventRecord {
                    id: RecordId::new(row.get(0)?),
                    payload: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?;
            let records = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            debug!(records = records.len(), "read oldest batch");
            Ok(Batch::from_records(records))
        })
    }

    /// Delete every record with `id <= watermark`; returns the rows left.
    ///
    /// Repeating a watermark that has already been passed deletes nothing.
    #[instrument(skip_all, fields(watermark = %watermark))]
    pub fn delete_through(&self, watermark: RecordId) -> Result<u64> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM events WHERE _id <= ?1", [watermark.get()])?;
            let remaining = count(conn)?;
            debug!(deleted, remaining, "deleted through watermark");
            Ok(remaining)
        })
    }

    /// Clear the queue. Ids keep increasing afterwards.
    #[instrument(skip(self))]
    pub fn delete_all(&self) -> Result<u64> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM events", [])?;
            debug!(deleted, "cleared event store");
            Ok(deleted as u64)
        })
    }

    /// Number of queued records.
    pub fn count(&self) -> Result<u64> {
        self.db.with_conn(count)
    }

    /// Bytes held by live pages: `(page_count - freelist_count) * page_size`.
    ///
    /// Pages freed by deletes are reused by later inserts, so they do not
    /// count against the ceiling.
    pub fn footprint(&self) -> Result<u64> {
        self.db.with_conn(footprint)
    }

    /// Id of the newest queued record, if any.
    pub fn newest_id(&self) -> Result<Option<RecordId>> {
        self.db.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row("SELECT MAX(_id) FROM events", [], |row| row.get(0))
                .optional()?
                .flatten();
            Ok(id.map(RecordId::new))
        })
    }
}

fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

fn footprint(conn: &Connection) -> Result<u64> {
    let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let free: i64 = conn.query_row("PRAGMA freelist_count", [], |row| row.get(0))?;
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    let live = pages.saturating_sub(free).max(0);
    Ok(u64::try_from(live.saturating_mul(page_size)).unwrap_or(0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use assert_matches::assert_matches;

    use super::*;

    const LARGE: u64 = 32 * 1024 * 1024;

    fn store() -> EventStore {
        EventStore::new(Database::in_memory().unwrap(), LARGE)
    }

    fn event(n: usize) -> String {
        serde_json::json!({"event": "view", "n": n}).to_string()
    }

    fn ids(batch: &Batch) -> Vec<i64> {
        batch.records().iter().map(|r| r.id.get()).collect()
    }

    #[test]
    fn append_returns_running_count() {
        let store = store();
        assert_eq!(store.append(&event(0)).unwrap(), 1);
        assert_eq!(store.append(&event(1)).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn read_oldest_is_fifo() {
        let store = store();
        for n in 0..5 {
            let _ = store.append(&event(n)).unwrap();
        }

        let batch = store.read_oldest(3).unwrap().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(ids(&batch), vec![1, 2, 3]);
        assert_eq!(batch.watermark(), RecordId::new(3));
        assert_eq!(batch.records()[0].payload, event(0));
        assert!(batch.records()[0].created_at > 0);

        // Reading does not consume.
        let again = store.read_oldest(10).unwrap().unwrap();
        assert_eq!(ids(&again), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn read_oldest_on_empty_store() {
        let store = store();
        assert!(store.read_oldest(50).unwrap().is_none());
        let _ = store.append(&event(0)).unwrap();
        assert!(store.read_oldest(0).unwrap().is_none());
    }

    #[test]
    fn delete_through_removes_prefix_only() {
        let store = store();
        for n in 0..6 {
            let _ = store.append(&event(n)).unwrap();
        }

        assert_eq!(store.delete_through(RecordId::new(4)).unwrap(), 2);
        let rest = store.read_oldest(10).unwrap().unwrap();
        assert_eq!(ids(&rest), vec![5, 6]);
    }

    #[test]
    fn delete_through_is_idempotent() {
        let store = store();
        for n in 0..3 {
            let _ = store.append(&event(n)).unwrap();
        }
        assert_eq!(store.delete_through(RecordId::new(2)).unwrap(), 1);
        assert_eq!(store.delete_through(RecordId::new(2)).unwrap(), 1);
        assert_eq!(store.delete_through(RecordId::new(1)).unwrap(), 1);
        assert_eq!(store.read_oldest(10).unwrap().unwrap().first_id(), RecordId::new(3));
    }

    #[test]
    fn ids_never_reused_after_delete_all() {
        let store = store();
        for n in 0..3 {
            let _ = store.append(&event(n)).unwrap();
        }
        assert_eq!(store.delete_all().unwrap(), 3);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.newest_id().unwrap().is_none());

        let _ = store.append(&event(9)).unwrap();
        assert_eq!(store.newest_id().unwrap(), Some(RecordId::new(4)));
    }

    #[test]
    fn capacity_exceeded_inserts_nothing() {
        let db = Database::in_memory().unwrap();
        let probe = EventStore::new(db.clone(), LARGE);
        let footprint = probe.footprint().unwrap();
        assert!(footprint > 0);

        let tight = EventStore::new(db, footprint + 10);
        assert_eq!(tight.append("{}").unwrap(), 1);

        let big = "x".repeat(64);
        let err = tight.append(&big).unwrap_err();
        assert_matches!(
            err,
            StoreError::CapacityExceeded { incoming: 64, limit, .. } if limit == footprint + 10
        );
        assert_eq!(tight.count().unwrap(), 1);
    }

    #[test]
    fn footprint_grows_with_data() {
        let store = store();
        let before = store.footprint().unwrap();
        let blob = "y".repeat(8 * 1024);
        for _ in 0..16 {
            let _ = store.append(&blob).unwrap();
        }
        assert!(store.footprint().unwrap() > before);
    }

    #[test]
    fn draining_a_full_store_makes_room_again() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("events.db")).unwrap();
        let base = EventStore::new(db.clone(), LARGE).footprint().unwrap();
        let store = EventStore::new(db, base + 256 * 1024);

        let blob = "z".repeat(4 * 1024);
        let mut appended = 0;
        while store.append(&blob).is_ok() {
            appended += 1;
            assert!(appended < 1_000, "ceiling never reached");
        }
        assert!(appended > 0);
        assert_matches!(store.append(&blob), Err(StoreError::CapacityExceeded { .. }));

        let newest = store.newest_id().unwrap().unwrap();
        assert_eq!(store.delete_through(newest).unwrap(), 0);
        assert!(store.footprint().unwrap() < base + 256 * 1024);

        assert_eq!(store.append("{}").unwrap(), 1);
        assert_eq!(store.append(&blob).unwrap(), 2);
    }

    #[test]
    fn concurrent_appends_keep_every_record() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for n in 0..25 {
                        let _ = store.append(&event(t * 100 + n)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count().unwrap(), 100);
        let batch = store.read_oldest(200).unwrap().unwrap();
        assert_eq!(ids(&batch), (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        {
            let store = EventStore::new(Database::open(&path).unwrap(), LARGE);
            let _ = store.append(&event(1)).unwrap();
            let _ = store.append(&event(2)).unwrap();
        }
        let store = EventStore::new(Database::open(&path).unwrap(), LARGE);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.read_oldest(1).unwrap().unwrap().records()[0].payload, event(1));
    }
}
