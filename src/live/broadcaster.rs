use futures::Stream;
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::SseMessage;
use super::registry::{BroadcastReport, ConnectionKey, ConnectionRegistry};
use crate::notifications::{HistoryReader, NotificationEvent, NotificationResponse};
use crate::server::metrics;

pub const DEFAULT_MAX_CONNECTION_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Failed to read missed notifications: {0:#}")]
    Replay(anyhow::Error),

    #[error("Failed to encode missed notification: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Pushes notification events to live connections and opens new subscriptions.
pub struct LiveBroadcaster {
    registry: ConnectionRegistry,
    history: Arc<HistoryReader>,
    max_connection_duration: Duration,
}

impl LiveBroadcaster {
    pub fn new(
        registry: ConnectionRegistry,
        history: Arc<HistoryReader>,
        max_connection_duration: Duration,
    ) -> Self {
        Self {
            registry,
            history,
            max_connection_duration,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Open a live subscription for `user_id`.
    ///
    /// The returned stream yields the `connected` message, then every stored
    /// notification with id greater than `last_event_id` in ascending order,
    /// then live messages. Must be called from within a tokio runtime.
    pub fn subscribe(
        &self,
        user_id: i64,
        last_event_id: Option<&str>,
    ) -> Result<Subscription, SubscribeError> {
        let (key, receiver) = self.registry.register(user_id);

        let timeout_registry = self.registry.clone();
        let max_duration = self.max_connection_duration;
        let timeout = tokio::spawn(async move {
            tokio::time::sleep(max_duration).await;
            if timeout_registry.remove(&key) {
                debug!("Connection {} reached max duration {:?}", key, max_duration);
            }
        });

        // From here on, dropping the guard closes the connection
        let guard = ConnectionGuard {
            registry: self.registry.clone(),
            key,
            timeout,
        };

        let mut preface = VecDeque::new();
        preface.push_back(SseMessage::connected());
        let mut replayed = HashSet::new();

        if let Some(after_id) = parse_last_event_id(user_id, last_event_id) {
            let missed = self
                .history
                .replay(user_id, after_id)
                .map_err(SubscribeError::Replay)?;
            if !missed.is_empty() {
                debug!(
                    "Replaying {} notifications after {} to {}",
                    missed.len(),
                    after_id,
                    key
                );
            }
            for record in missed {
                replayed.insert(record.notification_id);
                preface.push_back(SseMessage::notification(&NotificationResponse::from(record))?);
            }
        }

        debug!("Connection {} opened", key);
        Ok(Subscription {
            key,
            preface,
            replayed,
            receiver,
            _guard: guard,
        })
    }

    /// Push `event` to every open connection of `event.user_id`.
    pub fn broadcast(&self, event: &NotificationEvent) -> BroadcastReport {
        let message = match SseMessage::notification(&NotificationResponse::from(event)) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Failed to encode notification {}: {}",
                    event.notification_id, e
                );
                return BroadcastReport::default();
            }
        };

        let report = self.registry.broadcast_to_user(event.user_id, &message);
        if report.failed > 0 {
            warn!(
                "Notification {} failed on {} connections of user {}",
                event.notification_id, report.failed, event.user_id
            );
        }
        metrics::record_broadcast(report.delivered, report.failed);
        report
    }

    /// End every open subscription. Used on shutdown so streaming responses
    /// complete instead of holding the server open.
    pub fn close_all(&self) -> usize {
        let closed = self.registry.close_all();
        info!("Closed {} live connections", closed);
        closed
    }
}

fn parse_last_event_id(user_id: i64, last_event_id: Option<&str>) -> Option<i64> {
    let raw = last_event_id?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(
                "Ignoring non-numeric Last-Event-ID {:?} from user {}",
                raw, user_id
            );
            None
        }
    }
}

struct ConnectionGuard {
    registry: ConnectionRegistry,
    key: ConnectionKey,
    timeout: JoinHandle<()>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.timeout.abort();
        if let Some(established_at) = self.registry.established_at(&self.key) {
            let lifetime_ms = chrono::Utc::now().timestamp_millis() - established_at;
            debug!("Connection {} closed after {}ms", self.key, lifetime_ms);
        }
        self.registry.remove(&self.key);
    }
}

/// Client side of one live connection.
///
/// Dropping it removes the connection from the registry.
pub struct Subscription {
    key: ConnectionKey,
    preface: VecDeque<SseMessage>,
    replayed: HashSet<i64>,
    receiver: mpsc::UnboundedReceiver<SseMessage>,
    _guard: ConnectionGuard,
}

impl Subscription {
    pub fn key(&self) -> ConnectionKey {
        self.key
    }
}

impl Stream for Subscription {
    type Item = SseMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(message) = this.preface.pop_front() {
            return Poll::Ready(Some(message));
        }
        loop {
            match this.receiver.poll_recv(cx) {
                // Already delivered by the replay
                Poll::Ready(Some(message)) if this.replayed.contains(&message.id) => continue,
                other => return other,
            }
        }
    }
}
