//! Wiring of stores, consumers and background loops.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::delivery::{
    ConsumerSettings, ContentEventHandler, EventPublisher, NotificationEventHandler, RetryPolicy,
    StreamConsumer,
};
use crate::event_stream::{EventStream, SqliteEventStream};
use crate::ids::SnowflakeIdGenerator;
use crate::live::{ConnectionRegistry, LiveBroadcaster};
use crate::matcher::{HttpKeywordDirectory, KeywordDirectory, KeywordMatcher};
use crate::notifications::{
    FlushScheduler, HistoryReader, NotificationStore, SqliteNotificationStore, WriteBackBuffer,
};
use crate::server::{metrics, ServerConfig, ServerState};

/// Every long-lived component of a running notification server.
pub struct NotificationApp {
    config: AppConfig,
    stream: Arc<dyn EventStream>,
    store: Arc<dyn NotificationStore>,
    history: Arc<HistoryReader>,
    broadcaster: Arc<LiveBroadcaster>,
    buffer: Arc<WriteBackBuffer>,
    content_publisher: EventPublisher,
    matcher: Option<Arc<KeywordMatcher>>,
}

impl NotificationApp {
    /// Open the databases under `config.db_dir` and build the components.
    ///
    /// The keyword matcher is only built when a keyword directory is configured.
    pub fn open(config: AppConfig) -> Result<Self> {
        let directory = match &config.keyword_directory_url {
            Some(url) => {
                info!("Keyword directory configured at {}", url);
                let directory = HttpKeywordDirectory::new(url, config.keyword_directory_timeout_sec)?;
                Some(Arc::new(directory) as Arc<dyn KeywordDirectory>)
            }
            None => None,
        };
        Self::with_directory(config, directory)
    }

    pub fn with_directory(
        config: AppConfig,
        directory: Option<Arc<dyn KeywordDirectory>>,
    ) -> Result<Self> {
        info!("Opening event stream at {:?}...", config.stream_db_path());
        let stream: Arc<dyn EventStream> = Arc::new(
            SqliteEventStream::new(config.stream_db_path())
                .context("Failed to open event stream database")?,
        );

        info!("Opening notification store at {:?}...", config.notifications_db_path());
        let sqlite_store = Arc::new(
            SqliteNotificationStore::new(config.notifications_db_path())
                .context("Failed to open notification database")?,
        );
        let store: Arc<dyn NotificationStore> = sqlite_store.clone();

        let history = Arc::new(HistoryReader::new(sqlite_store.clone()));
        let broadcaster = Arc::new(LiveBroadcaster::new(
            ConnectionRegistry::new(),
            history.clone(),
            config.sse.max_connection_duration(),
        ));
        let buffer = Arc::new(WriteBackBuffer::new(sqlite_store, config.buffer.batch_size));

        let content_publisher =
            EventPublisher::new(stream.clone(), config.stream.content_topic.clone());

        let matcher = match directory {
            Some(directory) => {
                let ids = Arc::new(SnowflakeIdGenerator::new(
                    config.snowflake.worker_id,
                    config.snowflake.datacenter_id,
                )?);
                let notification_publisher =
                    EventPublisher::new(stream.clone(), config.stream.notification_topic.clone());
                Some(Arc::new(KeywordMatcher::new(
                    directory,
                    ids,
                    notification_publisher,
                )))
            }
            None => None,
        };

        Ok(Self {
            config,
            stream,
            store,
            history,
            broadcaster,
            buffer,
            content_publisher,
            matcher,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn stream(&self) -> Arc<dyn EventStream> {
        self.stream.clone()
    }

    pub fn store(&self) -> Arc<dyn NotificationStore> {
        self.store.clone()
    }

    pub fn broadcaster(&self) -> Arc<LiveBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn buffer(&self) -> Arc<WriteBackBuffer> {
        self.buffer.clone()
    }

    pub fn server_state(&self, hash: impl Into<String>) -> ServerState {
        ServerState {
            config: ServerConfig {
                requests_logging_level: self.config.logging_level.clone(),
                port: self.config.port,
                metrics_port: self.config.metrics_port,
                sse_keep_alive: self.config.sse.keep_alive(),
            },
            start_time: Instant::now(),
            hash: hash.into(),
            broadcaster: self.broadcaster.clone(),
            history: self.history.clone(),
            notification_store: self.store.clone(),
            content_publisher: self.content_publisher.clone(),
        }
    }

    fn consumer_settings(&self, topic: &str, group_id: &str) -> ConsumerSettings {
        let stream = &self.config.stream;
        ConsumerSettings {
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            dlt_suffix: stream.dlt_suffix.clone(),
            poll_batch_size: stream.poll_batch_size,
            poll_interval: stream.poll_interval(),
        }
    }

    /// Spawn the consumers, the flush loop and the stream pruner.
    pub fn start_background(&self) -> BackgroundTasks {
        let shutdown_token = CancellationToken::new();
        let policy = RetryPolicy::new(&self.config.delivery);
        let stream_config = &self.config.stream;
        let mut handles = Vec::new();

        let notification_consumer = StreamConsumer::new(
            self.stream.clone(),
            NotificationEventHandler::new(self.broadcaster.clone(), self.buffer.clone()),
            policy.clone(),
            self.consumer_settings(
                &stream_config.notification_topic,
                &stream_config.notification_group_id,
            ),
        );
        handles.push(notification_consumer.spawn(shutdown_token.clone()));

        match &self.matcher {
            Some(matcher) => {
                let content_consumer = StreamConsumer::new(
                    self.stream.clone(),
                    ContentEventHandler::new(matcher.clone()),
                    policy,
                    self.consumer_settings(
                        &stream_config.content_topic,
                        &stream_config.content_group_id,
                    ),
                );
                handles.push(content_consumer.spawn(shutdown_token.clone()));
            }
            None => warn!(
                "No keyword directory configured, content on {} will not be matched",
                stream_config.content_topic
            ),
        }

        if stream_config.retention_hours > 0 {
            handles.push(spawn_stream_pruner(
                self.stream.clone(),
                Duration::from_secs(stream_config.retention_hours * 60 * 60),
                Duration::from_secs(stream_config.prune_interval_minutes.max(1) * 60),
                shutdown_token.clone(),
            ));
        }

        let flusher = FlushScheduler::start(self.buffer.clone(), self.config.buffer.flush_interval());

        BackgroundTasks {
            shutdown_token,
            handles,
            flusher,
        }
    }
}

/// Handles of the loops started by [`NotificationApp::start_background`].
pub struct BackgroundTasks {
    shutdown_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    flusher: FlushScheduler,
}

impl BackgroundTasks {
    /// Stop consuming, then drain whatever the buffer still holds.
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!("Background task failed: {}", err);
            }
        }
        self.flusher.stop().await;
    }
}

fn spawn_stream_pruner(
    stream: Arc<dyn EventStream>,
    retention: Duration,
    interval: Duration,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    info!(
        "Stream pruning enabled: retaining {:?}, pruning every {:?}",
        retention, interval
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_token.cancelled() => break,
            }

            let cutoff = chrono::Utc::now().timestamp_millis() - retention.as_millis() as i64;
            match stream.prune_before(cutoff) {
                Ok(count) => {
                    if count > 0 {
                        info!("Pruned {} old stream records", count);
                        metrics::record_stream_pruned(count);
                    }
                }
                Err(e) => {
                    error!("Failed to prune stream records: {}", e);
                }
            }
        }
    })
}
