use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::event_stream::EventStream;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to append to stream: {0}")]
    Stream(#[from] anyhow::Error),
}

/// Serializes values to JSON and appends them to one topic.
#[derive(Clone)]
pub struct EventPublisher {
    stream: Arc<dyn EventStream>,
    topic: String,
}

impl EventPublisher {
    pub fn new(stream: Arc<dyn EventStream>, topic: impl Into<String>) -> Self {
        Self {
            stream,
            topic: topic.into(),
        }
    }

    /// Returns the offset assigned by the stream.
    pub fn publish<T: Serialize>(&self, event: &T) -> Result<i64, PublishError> {
        let payload = serde_json::to_string(event)?;
        let offset = self.stream.publish(&self.topic, &payload)?;
        debug!("Published to {} at offset {}", self.topic, offset);
        Ok(offset)
    }
}
