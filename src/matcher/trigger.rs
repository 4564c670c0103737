use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::directory::KeywordDirectory;
use super::keywords::extract_keywords;
use super::models::CrawledContent;
use crate::delivery::{EventPublisher, PublishError};
use crate::ids::SnowflakeIdGenerator;
use crate::notifications::{NotificationEvent, KEYWORD_MATCH_MESSAGE};
use crate::server::metrics;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Keyword directory lookup failed: {0:#}")]
    Directory(anyhow::Error),

    #[error("Failed to publish notification for user {user_id}: {source}")]
    Publish {
        user_id: i64,
        #[source]
        source: PublishError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    NoKeywords,
    NoSubscribers,
    /// Number of notification events published.
    Published(usize),
}

/// Turns crawled content into one notification event per subscribed user.
pub struct KeywordMatcher {
    directory: Arc<dyn KeywordDirectory>,
    ids: Arc<SnowflakeIdGenerator>,
    publisher: EventPublisher,
}

impl KeywordMatcher {
    pub fn new(
        directory: Arc<dyn KeywordDirectory>,
        ids: Arc<SnowflakeIdGenerator>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            directory,
            ids,
            publisher,
        }
    }

    /// Events published before a failure stay published; the rest of the
    /// fan-out is abandoned.
    pub async fn match_and_publish(
        &self,
        content: &CrawledContent,
    ) -> Result<MatchOutcome, MatchError> {
        let keywords = extract_keywords(content.title.as_deref(), content.summary.as_deref());
        if keywords.is_empty() {
            debug!("No keywords in content {:?}", content.title);
            return Ok(MatchOutcome::NoKeywords);
        }

        let user_ids = self
            .directory
            .find_subscribers(&keywords, content.source_id)
            .await
            .map_err(MatchError::Directory)?;
        if user_ids.is_empty() {
            return Ok(MatchOutcome::NoSubscribers);
        }

        info!(
            "Found {} subscribers for content {:?} (source {})",
            user_ids.len(),
            content.title,
            content.source_id
        );

        for &user_id in &user_ids {
            let event = NotificationEvent {
                notification_id: self.ids.next_id(),
                user_id,
                content_id: content.content_id,
                title: content.title.clone().unwrap_or_default(),
                message: KEYWORD_MATCH_MESSAGE.to_string(),
                original_url: content.original_url.clone(),
            };
            self.publisher
                .publish(&event)
                .map_err(|source| MatchError::Publish { user_id, source })?;
            metrics::record_notification_published();
        }

        Ok(MatchOutcome::Published(user_ids.len()))
    }
}
