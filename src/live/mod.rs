//! Live delivery to connected clients over server-sent events.

mod broadcaster;
mod messages;
mod registry;

pub use broadcaster::{LiveBroadcaster, SubscribeError, Subscription, DEFAULT_MAX_CONNECTION_DURATION};
pub use messages::{SseMessage, CONNECTED_DATA, NOTIFICATION_EVENT_NAME};
pub use registry::{BroadcastReport, ConnectionKey, ConnectionRegistry};
