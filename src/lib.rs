//! Keyword-match notification server
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod app;
pub mod config;
pub mod delivery;
pub mod event_stream;
pub mod ids;
pub mod live;
pub mod matcher;
pub mod notifications;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use app::{BackgroundTasks, NotificationApp};
pub use event_stream::{EventStream, SqliteEventStream};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerState};
