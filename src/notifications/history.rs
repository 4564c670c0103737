//! Cursor-paginated read path over persisted notifications.

use anyhow::Result;
use std::sync::Arc;

use super::models::{NotificationRecord, NotificationResponse, Page};
use super::store::NotificationReader;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;

pub struct HistoryReader {
    reader: Arc<dyn NotificationReader>,
}

impl HistoryReader {
    pub fn new(reader: Arc<dyn NotificationReader>) -> Self {
        Self { reader }
    }

    /// The newest `size + 1` records of a user, descending.
    pub fn first_page(&self, user_id: i64, size: usize) -> Result<Vec<NotificationRecord>> {
        self.reader.find_latest(user_id, size + 1)
    }

    /// Up to `size + 1` records with id strictly below `cursor_id`, descending.
    pub fn next_page(
        &self,
        user_id: i64,
        cursor_id: i64,
        size: usize,
    ) -> Result<Vec<NotificationRecord>> {
        self.reader.find_before(user_id, cursor_id, size + 1)
    }

    /// One page of a user's history. `last_id` is the cursor returned by the previous page.
    ///
    /// `size` is clamped into `1..=MAX_PAGE_SIZE`.
    pub fn history(
        &self,
        user_id: i64,
        last_id: Option<i64>,
        size: usize,
    ) -> Result<Page<NotificationResponse>> {
        let size = size.clamp(1, MAX_PAGE_SIZE);

        let mut records = match last_id {
            None => self.first_page(user_id, size)?,
            Some(cursor_id) => self.next_page(user_id, cursor_id, size)?,
        };

        let has_next = records.len() > size;
        records.truncate(size);
        let next_cursor_id = records.last().map(|r| r.notification_id);

        Ok(Page {
            content: records.into_iter().map(NotificationResponse::from).collect(),
            next_cursor_id,
            has_next,
        })
    }

    /// Records a reconnecting client missed: every id greater than `after_id`, ascending.
    pub fn replay(&self, user_id: i64, after_id: i64) -> Result<Vec<NotificationRecord>> {
        self.reader.find_all_after(user_id, after_id)
    }
}
