//! Durable side of notification delivery: table, buffered writes and history reads.

mod buffer;
mod flusher;
mod history;
mod models;
mod schema;
mod store;

pub use buffer::{FlushOutcome, WriteBackBuffer, DEFAULT_BATCH_SIZE};
pub use flusher::{FlushScheduler, DEFAULT_FLUSH_INTERVAL};
pub use history::{HistoryReader, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use models::{
    NotificationEvent, NotificationRecord, NotificationResponse, Page, KEYWORD_MATCH_MESSAGE,
};
pub use store::{
    NotificationReader, NotificationStore, NotificationWriter, SqliteNotificationStore,
};
