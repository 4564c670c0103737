//! Event publishing and stream consumption with retry and dead-lettering.

mod consumer;
mod handlers;
mod publisher;
mod retry_policy;

pub use consumer::{ConsumerSettings, DeliveryOutcome, MessageHandler, StreamConsumer};
pub use handlers::{ContentEventHandler, NotificationEventHandler};
pub use publisher::{EventPublisher, PublishError};
pub use retry_policy::{ProcessingError, RetryPolicy};
