//! Messages pushed to live SSE connections.

use axum::response::sse::Event;

use crate::notifications::NotificationResponse;

/// SSE event name shared by every pushed message.
pub const NOTIFICATION_EVENT_NAME: &str = "notification";
pub const CONNECTED_DATA: &str = "connected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub id: i64,
    pub name: &'static str,
    pub data: String,
}

impl SseMessage {
    /// First message of every connection.
    ///
    /// It carries id 0, so a client that reconnects before receiving any
    /// notification sends `Last-Event-ID: 0` and gets its whole history replayed.
    pub fn connected() -> Self {
        Self {
            id: 0,
            name: NOTIFICATION_EVENT_NAME,
            data: CONNECTED_DATA.to_string(),
        }
    }

    pub fn notification(notification: &NotificationResponse) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: notification.id,
            name: NOTIFICATION_EVENT_NAME,
            data: serde_json::to_string(notification)?,
        })
    }
}

impl From<SseMessage> for Event {
    fn from(message: SseMessage) -> Self {
        Event::default()
            .id(message.id.to_string())
            .event(message.name)
            .data(message.data)
    }
}
