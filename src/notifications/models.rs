//! Notification data models

use serde::{Deserialize, Serialize};

/// Message carried by every keyword-match notification.
pub const KEYWORD_MATCH_MESSAGE: &str = "A new post matching your keyword has been published.";

/// A notification event as it travels on the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub notification_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub content_id: Option<i64>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub original_url: Option<String>,
}

/// A notification as persisted in the notification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub notification_id: i64,
    pub user_id: i64,
    pub content_id: Option<i64>,
    pub title: String,
    pub message: String,
    pub original_url: Option<String>,
    /// Unix millis, shared by every row of the same flush batch.
    pub created_at: i64,
    pub is_read: bool,
}

/// What clients see, both on the live stream and in history pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub original_url: Option<String>,
}

impl From<&NotificationEvent> for NotificationResponse {
    fn from(event: &NotificationEvent) -> Self {
        Self {
            id: event.notification_id,
            title: event.title.clone(),
            message: event.message.clone(),
            original_url: event.original_url.clone(),
        }
    }
}

impl From<NotificationRecord> for NotificationResponse {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: record.notification_id,
            title: record.title,
            message: record.message,
            original_url: record.original_url,
        }
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub next_cursor_id: Option<i64>,
    pub has_next: bool,
}
