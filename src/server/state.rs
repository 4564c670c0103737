use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use crate::delivery::EventPublisher;
use crate::live::LiveBroadcaster;
use crate::notifications::{HistoryReader, NotificationStore};

use super::ServerConfig;

pub type GuardedBroadcaster = Arc<LiveBroadcaster>;
pub type GuardedHistoryReader = Arc<HistoryReader>;
pub type GuardedNotificationStore = Arc<dyn NotificationStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub broadcaster: GuardedBroadcaster,
    pub history: GuardedHistoryReader,
    pub notification_store: GuardedNotificationStore,
    /// Publishes ingested content onto the content topic.
    pub content_publisher: EventPublisher,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedBroadcaster {
    fn from_ref(input: &ServerState) -> Self {
        input.broadcaster.clone()
    }
}

impl FromRef<ServerState> for GuardedHistoryReader {
    fn from_ref(input: &ServerState) -> Self {
        input.history.clone()
    }
}

impl FromRef<ServerState> for GuardedNotificationStore {
    fn from_ref(input: &ServerState) -> Self {
        input.notification_store.clone()
    }
}

impl FromRef<ServerState> for EventPublisher {
    fn from_ref(input: &ServerState) -> Self {
        input.content_publisher.clone()
    }
}
