use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::schema::STREAM_VERSIONED_SCHEMAS;
use super::{EventStream, StreamRecord};
use crate::sqlite_persistence::open_versioned;

pub struct SqliteEventStream {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStream {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, STREAM_VERSIONED_SCHEMAS, "event stream")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Event stream connection lock poisoned"))
    }
}

impl EventStream for SqliteEventStream {
    fn publish(&self, topic: &str, payload: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stream_records (topic, payload, published_at) VALUES (?1, ?2, ?3)",
            params![topic, payload, chrono::Utc::now().timestamp_millis()],
        )
        .with_context(|| format!("Failed to publish to topic {}", topic))?;
        Ok(conn.last_insert_rowid())
    }

    fn poll(&self, topic: &str, group_id: &str, max_records: usize) -> Result<Vec<StreamRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT record_offset, topic, payload, published_at FROM stream_records
             WHERE topic = ?1 AND record_offset > COALESCE(
                 (SELECT committed_offset FROM consumer_offsets WHERE topic = ?1 AND group_id = ?2),
                 0)
             ORDER BY record_offset ASC
             LIMIT ?3",
        )?;
        let records = stmt
            .query_map(params![topic, group_id, max_records as i64], |row| {
                Ok(StreamRecord {
                    offset: row.get(0)?,
                    topic: row.get(1)?,
                    payload: row.get(2)?,
                    published_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn commit(&self, topic: &str, group_id: &str, offset: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO consumer_offsets (topic, group_id, committed_offset) VALUES (?1, ?2, ?3)
             ON CONFLICT(topic, group_id)
             DO UPDATE SET committed_offset = MAX(committed_offset, excluded.committed_offset)",
            params![topic, group_id, offset],
        )
        .with_context(|| format!("Failed to commit offset {} for {}/{}", offset, topic, group_id))?;
        Ok(())
    }

    fn committed_offset(&self, topic: &str, group_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let offset = conn
            .query_row(
                "SELECT committed_offset FROM consumer_offsets WHERE topic = ?1 AND group_id = ?2",
                params![topic, group_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(offset.unwrap_or(0))
    }

    fn prune_before(&self, cutoff_millis: i64) -> Result<usize> {
        let conn = self.conn()?;
        // The newest record is always kept so offsets are never reused.
        // Topics nobody consumes are pruned by age alone.
        let deleted = conn.execute(
            "DELETE FROM stream_records
             WHERE published_at < ?1
               AND record_offset < (SELECT MAX(record_offset) FROM stream_records)
               AND record_offset <= COALESCE(
                   (SELECT MIN(c.committed_offset) FROM consumer_offsets c
                    WHERE c.topic = stream_records.topic),
                   record_offset)",
            params![cutoff_millis],
        )?;
        debug!("Pruned {} stream records older than {}", deleted, cutoff_millis);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_stream() -> (TempDir, SqliteEventStream) {
        let dir = TempDir::new().unwrap();
        let stream = SqliteEventStream::new(dir.path().join("stream.db")).unwrap();
        (dir, stream)
    }

    fn payloads(records: &[StreamRecord]) -> Vec<&str> {
        records.iter().map(|r| r.payload.as_str()).collect()
    }

    #[test]
    fn publish_assigns_increasing_offsets() {
        let (_dir, stream) = make_stream();
        let a = stream.publish("t", "a").unwrap();
        let b = stream.publish("other", "b").unwrap();
        let c = stream.publish("t", "c").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn poll_is_scoped_to_topic_and_limited() {
        let (_dir, stream) = make_stream();
        stream.publish("t", "a").unwrap();
        stream.publish("other", "x").unwrap();
        stream.publish("t", "b").unwrap();
        stream.publish("t", "c").unwrap();

        let records = stream.poll("t", "g", 2).unwrap();
        assert_eq!(payloads(&records), vec!["a", "b"]);
        assert!(records.iter().all(|r| r.topic == "t"));
    }

    #[test]
    fn uncommitted_records_are_polled_again() {
        let (_dir, stream) = make_stream();
        stream.publish("t", "a").unwrap();
        stream.publish("t", "b").unwrap();

        assert_eq!(payloads(&stream.poll("t", "g", 10).unwrap()), vec!["a", "b"]);
        assert_eq!(payloads(&stream.poll("t", "g", 10).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn commit_advances_per_group() {
        let (_dir, stream) = make_stream();
        let a = stream.publish("t", "a").unwrap();
        stream.publish("t", "b").unwrap();

        stream.commit("t", "g1", a).unwrap();
        assert_eq!(payloads(&stream.poll("t", "g1", 10).unwrap()), vec!["b"]);
        assert_eq!(payloads(&stream.poll("t", "g2", 10).unwrap()), vec!["a", "b"]);
        assert_eq!(stream.committed_offset("t", "g1").unwrap(), a);
        assert_eq!(stream.committed_offset("t", "g2").unwrap(), 0);
    }

    #[test]
    fn commit_never_moves_backwards() {
        let (_dir, stream) = make_stream();
        let a = stream.publish("t", "a").unwrap();
        let b = stream.publish("t", "b").unwrap();

        stream.commit("t", "g", b).unwrap();
        stream.commit("t", "g", a).unwrap();
        assert_eq!(stream.committed_offset("t", "g").unwrap(), b);
    }

    #[test]
    fn prune_keeps_uncommitted_and_newest_records() {
        let (_dir, stream) = make_stream();
        let a = stream.publish("t", "a").unwrap();
        let b = stream.publish("t", "b").unwrap();
        stream.publish("t", "c").unwrap();

        stream.commit("t", "g1", b).unwrap();
        stream.commit("t", "g2", a).unwrap();

        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        // Only "a" is committed by every group
        assert_eq!(stream.prune_before(future).unwrap(), 1);
        assert_eq!(payloads(&stream.poll("t", "g2", 10).unwrap()), vec!["b", "c"]);

        stream.commit("t", "g1", 100).unwrap();
        stream.commit("t", "g2", 100).unwrap();
        // "c" is the newest record and survives
        assert_eq!(stream.prune_before(future).unwrap(), 1);
        let next = stream.publish("t", "d").unwrap();
        assert!(next > b);
    }

    #[test]
    fn prune_respects_cutoff() {
        let (_dir, stream) = make_stream();
        let a = stream.publish("t", "a").unwrap();
        stream.publish("t", "b").unwrap();
        stream.commit("t", "g", a).unwrap();

        assert_eq!(stream.prune_before(0).unwrap(), 0);
    }
}
