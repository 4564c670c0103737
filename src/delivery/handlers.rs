use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::consumer::MessageHandler;
use super::publisher::PublishError;
use super::retry_policy::ProcessingError;
use crate::live::LiveBroadcaster;
use crate::matcher::{CrawledContent, KeywordMatcher, MatchError};
use crate::notifications::{NotificationEvent, WriteBackBuffer};

/// Delivers notification events: live push first, then queued for persistence.
pub struct NotificationEventHandler {
    broadcaster: Arc<LiveBroadcaster>,
    buffer: Arc<WriteBackBuffer>,
}

impl NotificationEventHandler {
    pub fn new(broadcaster: Arc<LiveBroadcaster>, buffer: Arc<WriteBackBuffer>) -> Self {
        Self {
            broadcaster,
            buffer,
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationEventHandler {
    async fn handle(&self, payload: &str) -> Result<(), ProcessingError> {
        let event: NotificationEvent = serde_json::from_str(payload)
            .map_err(|e| ProcessingError::Terminal(e.into()))?;

        let report = self.broadcaster.broadcast(&event);
        debug!(
            "Notification {} pushed to {} connections of user {}",
            event.notification_id, report.delivered, event.user_id
        );

        self.buffer.enqueue(event);
        Ok(())
    }
}

/// Runs keyword matching for crawled content.
pub struct ContentEventHandler {
    matcher: Arc<KeywordMatcher>,
}

impl ContentEventHandler {
    pub fn new(matcher: Arc<KeywordMatcher>) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl MessageHandler for ContentEventHandler {
    async fn handle(&self, payload: &str) -> Result<(), ProcessingError> {
        let content: CrawledContent = serde_json::from_str(payload)
            .map_err(|e| ProcessingError::Terminal(e.into()))?;

        match self.matcher.match_and_publish(&content).await {
            Ok(outcome) => {
                debug!("Content {:?}: {:?}", content.title, outcome);
                Ok(())
            }
            Err(
                e @ MatchError::Publish {
                    source: PublishError::Serialization(_),
                    ..
                },
            ) => Err(ProcessingError::Terminal(e.into())),
            Err(e) => Err(ProcessingError::Retryable(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::EventPublisher;
    use crate::event_stream::{EventStream, SqliteEventStream};
    use crate::ids::SnowflakeIdGenerator;
    use crate::live::ConnectionRegistry;
    use crate::matcher::KeywordDirectory;
    use crate::notifications::{HistoryReader, NotificationReader, SqliteNotificationStore};
    use anyhow::{bail, Result};
    use futures::StreamExt;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticDirectory(Option<Vec<i64>>);

    #[async_trait]
    impl KeywordDirectory for StaticDirectory {
        async fn find_subscribers(&self, _: &BTreeSet<String>, _: i64) -> Result<Vec<i64>> {
            match &self.0 {
                Some(users) => Ok(users.clone()),
                None => bail!("directory down"),
            }
        }
    }

    fn notification_json(id: i64, user_id: i64) -> String {
        serde_json::to_string(&NotificationEvent {
            notification_id: id,
            user_id,
            content_id: Some(3),
            title: "Spring Boot 3.0".to_string(),
            message: "m".to_string(),
            original_url: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn notification_is_pushed_then_buffered() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteNotificationStore::new(dir.path().join("n.db")).unwrap());
        let history = Arc::new(HistoryReader::new(store.clone()));
        let broadcaster = Arc::new(LiveBroadcaster::new(
            ConnectionRegistry::new(),
            history,
            Duration::from_secs(60),
        ));
        let buffer = Arc::new(WriteBackBuffer::new(store.clone(), 10));
        let handler = NotificationEventHandler::new(broadcaster.clone(), buffer.clone());

        let mut subscription = broadcaster.subscribe(1, None).unwrap();
        handler.handle(&notification_json(11, 1)).await.unwrap();

        assert_eq!(subscription.next().await.unwrap().id, 0);
        assert_eq!(subscription.next().await.unwrap().id, 11);
        assert_eq!(buffer.pending(), 1);
        // Not persisted until the buffer flushes
        assert!(store.find_all_after(1, 0).unwrap().is_empty());

        buffer.flush();
        assert_eq!(store.find_all_after(1, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notification_without_connections_is_still_buffered() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteNotificationStore::new(dir.path().join("n.db")).unwrap());
        let broadcaster = Arc::new(LiveBroadcaster::new(
            ConnectionRegistry::new(),
            Arc::new(HistoryReader::new(store.clone())),
            Duration::from_secs(60),
        ));
        let buffer = Arc::new(WriteBackBuffer::new(store, 10));
        let handler = NotificationEventHandler::new(broadcaster, buffer.clone());

        handler.handle(&notification_json(12, 2)).await.unwrap();
        assert_eq!(buffer.pending(), 1);
    }

    #[tokio::test]
    async fn malformed_notification_is_terminal() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteNotificationStore::new(dir.path().join("n.db")).unwrap());
        let broadcaster = Arc::new(LiveBroadcaster::new(
            ConnectionRegistry::new(),
            Arc::new(HistoryReader::new(store.clone())),
            Duration::from_secs(60),
        ));
        let buffer = Arc::new(WriteBackBuffer::new(store, 10));
        let handler = NotificationEventHandler::new(broadcaster, buffer.clone());

        let err = handler.handle("{\"userId\": 1}").await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(buffer.pending(), 0);
    }

    fn content_handler(
        directory: StaticDirectory,
    ) -> (TempDir, Arc<SqliteEventStream>, ContentEventHandler) {
        let dir = TempDir::new().unwrap();
        let stream = Arc::new(SqliteEventStream::new(dir.path().join("s.db")).unwrap());
        let matcher = KeywordMatcher::new(
            Arc::new(directory),
            Arc::new(SnowflakeIdGenerator::new(0, 0).unwrap()),
            EventPublisher::new(stream.clone(), "notification.created"),
        );
        (dir, stream, ContentEventHandler::new(Arc::new(matcher)))
    }

    #[tokio::test]
    async fn content_fans_out_to_notification_topic() {
        let (_dir, stream, handler) = content_handler(StaticDirectory(Some(vec![1, 2])));

        handler
            .handle(r#"{"sourceId":5,"title":"Spring Boot 3.0"}"#)
            .await
            .unwrap();

        let records = stream.poll("notification.created", "g", 10).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn directory_failure_is_retryable() {
        let (_dir, _stream, handler) = content_handler(StaticDirectory(None));

        let err = handler
            .handle(r#"{"sourceId":5,"title":"Spring Boot 3.0"}"#)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_content_is_terminal() {
        let (_dir, _stream, handler) = content_handler(StaticDirectory(Some(vec![1])));

        let err = handler.handle("not json").await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
