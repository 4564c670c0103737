//! Polling consumer for one topic of the event stream.
//!
//! Each record is handled under a `RetryPolicy`. Records that still fail, or
//! fail terminally, are copied to the dead-letter topic. The offset is
//! committed once a record is handled or dead-lettered, so a crash between
//! handling and commit redelivers the record.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry_policy::{ProcessingError, RetryPolicy};
use crate::event_stream::{EventStream, StreamRecord};
use crate::server::metrics;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &str) -> Result<(), ProcessingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Processed { attempts: u32 },
    DeadLettered { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub topic: String,
    pub group_id: String,
    pub dlt_suffix: String,
    pub poll_batch_size: usize,
    pub poll_interval: Duration,
}

pub struct StreamConsumer<H: MessageHandler> {
    stream: Arc<dyn EventStream>,
    handler: H,
    policy: RetryPolicy,
    settings: ConsumerSettings,
    dlt_topic: String,
}

impl<H: MessageHandler + 'static> StreamConsumer<H> {
    pub fn new(
        stream: Arc<dyn EventStream>,
        handler: H,
        policy: RetryPolicy,
        settings: ConsumerSettings,
    ) -> Self {
        let dlt_topic = format!("{}{}", settings.topic, settings.dlt_suffix);
        Self {
            stream,
            handler,
            policy,
            settings,
            dlt_topic,
        }
    }

    pub fn dlt_topic(&self) -> &str {
        &self.dlt_topic
    }

    /// Handle one record, dead-letter it if needed, then commit its offset.
    ///
    /// Fails only when the dead-letter publish or the commit fails; the offset
    /// is then left uncommitted and the record will be polled again.
    pub async fn process_record(&self, record: &StreamRecord) -> anyhow::Result<DeliveryOutcome> {
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self.handler.handle(&record.payload).await {
                Ok(()) => break DeliveryOutcome::Processed { attempts },
                Err(e) if self.policy.should_retry(&e, attempts) => {
                    let backoff = self.policy.backoff(attempts);
                    warn!(
                        "Record {} on {} failed (attempt {}/{}), retrying in {:?}: {}",
                        record.offset,
                        record.topic,
                        attempts,
                        self.policy.max_attempts,
                        backoff,
                        e
                    );
                    metrics::record_consumer_retry(&self.settings.topic);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        "Record {} on {} failed after {} attempts, dead-lettering: {}",
                        record.offset, record.topic, attempts, e
                    );
                    self.stream.publish(&self.dlt_topic, &record.payload)?;
                    metrics::record_dead_letter(&self.settings.topic);
                    break DeliveryOutcome::DeadLettered { attempts };
                }
            }
        };

        self.stream
            .commit(&self.settings.topic, &self.settings.group_id, record.offset)?;
        Ok(outcome)
    }

    /// Poll once and process the returned records in order.
    ///
    /// Stops at the first record that could not be committed so that ordering
    /// is kept on redelivery. Returns the number of committed records.
    pub async fn poll_once(&self) -> anyhow::Result<usize> {
        let records = self.stream.poll(
            &self.settings.topic,
            &self.settings.group_id,
            self.settings.poll_batch_size,
        )?;

        let mut committed = 0;
        for record in &records {
            match self.process_record(record).await {
                Ok(outcome) => {
                    debug!("Record {} on {}: {:?}", record.offset, record.topic, outcome);
                    committed += 1;
                }
                Err(e) => {
                    error!(
                        "Record {} on {} left uncommitted: {:#}",
                        record.offset, record.topic, e
                    );
                    break;
                }
            }
        }
        Ok(committed)
    }

    /// Run the poll loop until `shutdown_token` is cancelled.
    pub async fn run(self, shutdown_token: CancellationToken) {
        info!(
            "Consuming {} as {} (dead letters on {})",
            self.settings.topic, self.settings.group_id, self.dlt_topic
        );

        loop {
            if shutdown_token.is_cancelled() {
                break;
            }

            let idle = match self.poll_once().await {
                Ok(committed) => committed == 0,
                Err(e) => {
                    error!("Failed to poll {}: {:#}", self.settings.topic, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    _ = shutdown_token.cancelled() => break,
                }
            }
        }

        info!("Consumer for {} stopped", self.settings.topic);
    }

    pub fn spawn(self, shutdown_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown_token))
    }
}
