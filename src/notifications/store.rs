//! Notification storage traits and the SQLite implementation.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::models::{NotificationEvent, NotificationRecord};
use super::schema::NOTIFICATION_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;

/// Write side of the notification table, used by the write-back buffer.
pub trait NotificationWriter: Send + Sync {
    /// Insert a batch of events in a single transaction, all stamped with `created_at`.
    /// Rows whose `notification_id` already exists are skipped.
    /// Returns the number of rows actually inserted.
    fn insert_batch(&self, events: &[NotificationEvent], created_at: i64) -> Result<usize>;
}

/// Read side of the notification table.
pub trait NotificationReader: Send + Sync {
    /// All notifications of a user with id strictly greater than `after_id`, ascending.
    fn find_all_after(&self, user_id: i64, after_id: i64) -> Result<Vec<NotificationRecord>>;

    /// The newest `limit` notifications of a user, descending.
    fn find_latest(&self, user_id: i64, limit: usize) -> Result<Vec<NotificationRecord>>;

    /// Up to `limit` notifications of a user with id strictly lower than `before_id`, descending.
    fn find_before(
        &self,
        user_id: i64,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>>;
}

pub trait NotificationStore: NotificationWriter + NotificationReader + Send + Sync {
    /// Mark a notification as read.
    /// Returns false if the notification doesn't exist or doesn't belong to the user.
    fn mark_as_read(&self, user_id: i64, notification_id: i64) -> Result<bool>;

    /// Number of unread notifications of a user.
    fn count_unread(&self, user_id: i64) -> Result<usize>;
}

const SELECT_COLUMNS: &str = "notification_id, user_id, content_id, title, message, original_url, created_at, is_read";

pub struct SqliteNotificationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNotificationStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, NOTIFICATION_VERSIONED_SCHEMAS, "notification")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Notification database connection lock poisoned"))
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<NotificationRecord> {
        Ok(NotificationRecord {
            notification_id: row.get("notification_id")?,
            user_id: row.get("user_id")?,
            content_id: row.get("content_id")?,
            title: row.get("title")?,
            message: row.get("message")?,
            original_url: row.get("original_url")?,
            created_at: row.get("created_at")?,
            is_read: row.get::<_, i64>("is_read")? != 0,
        })
    }

    fn query_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

impl NotificationWriter for SqliteNotificationStore {
    fn insert_batch(&self, events: &[NotificationEvent], created_at: i64) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO notification
                    (notification_id, user_id, content_id, title, message, original_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for event in events {
                inserted += stmt
                    .execute(params![
                        event.notification_id,
                        event.user_id,
                        event.content_id,
                        event.title,
                        event.message,
                        event.original_url,
                        created_at,
                    ])
                    .with_context(|| {
                        format!("Failed to insert notification {}", event.notification_id)
                    })?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl NotificationReader for SqliteNotificationStore {
    fn find_all_after(&self, user_id: i64, after_id: i64) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM notification
                 WHERE user_id = ?1 AND notification_id > ?2
                 ORDER BY notification_id ASC",
                SELECT_COLUMNS
            ),
            params![user_id, after_id],
        )
    }

    fn find_latest(&self, user_id: i64, limit: usize) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM notification
                 WHERE user_id = ?1
                 ORDER BY notification_id DESC
                 LIMIT ?2",
                SELECT_COLUMNS
            ),
            params![user_id, limit as i64],
        )
    }

    fn find_before(
        &self,
        user_id: i64,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM notification
                 WHERE user_id = ?1 AND notification_id < ?2
                 ORDER BY notification_id DESC
                 LIMIT ?3",
                SELECT_COLUMNS
            ),
            params![user_id, before_id, limit as i64],
        )
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn mark_as_read(&self, user_id: i64, notification_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE notification SET is_read = 1 WHERE notification_id = ?1 AND user_id = ?2",
            params![notification_id, user_id],
        )?;
        Ok(updated > 0)
    }

    fn count_unread(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
