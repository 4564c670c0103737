//! Durable topic log with per-group committed offsets.
//!
//! Producers append JSON payloads to a named topic. Consumers poll records past
//! their group's committed offset and commit after processing, which gives
//! at-least-once delivery: a record whose offset was not committed is polled
//! again.

mod schema;
mod sqlite_stream;

pub use sqlite_stream::SqliteEventStream;

use anyhow::Result;

pub const DEFAULT_CONTENT_TOPIC: &str = "content.crawled";
pub const DEFAULT_NOTIFICATION_TOPIC: &str = "notification.created";
pub const DEFAULT_DLT_SUFFIX: &str = ".dlt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub offset: i64,
    pub topic: String,
    pub payload: String,
    /// Unix millis.
    pub published_at: i64,
}

pub trait EventStream: Send + Sync {
    /// Append a payload to a topic, returning its offset.
    fn publish(&self, topic: &str, payload: &str) -> Result<i64>;

    /// Up to `max_records` records of `topic` past the group's committed offset, ascending.
    fn poll(&self, topic: &str, group_id: &str, max_records: usize) -> Result<Vec<StreamRecord>>;

    /// Record that the group processed everything up to and including `offset`.
    /// Committing an offset lower than the current one is a no-op.
    fn commit(&self, topic: &str, group_id: &str, offset: i64) -> Result<()>;

    /// The group's committed offset, 0 when it never committed.
    fn committed_offset(&self, topic: &str, group_id: &str) -> Result<i64>;

    /// Delete records published before `cutoff_millis` that every group of their
    /// topic already committed. Returns the number of deleted records.
    fn prune_before(&self, cutoff_millis: i64) -> Result<usize>;
}
