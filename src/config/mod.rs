mod file_config;

pub use file_config::{
    BufferConfig, DeliveryConfig, FileConfig, SnowflakeConfig, SseConfig, StreamConfig,
};

use crate::event_stream::{DEFAULT_CONTENT_TOPIC, DEFAULT_DLT_SUFFIX, DEFAULT_NOTIFICATION_TOPIC};
use crate::ids::{MAX_DATACENTER_ID, MAX_WORKER_ID};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONTENT_GROUP_ID: &str = "match.content.collector";
pub const DEFAULT_NOTIFICATION_GROUP_ID: &str = "notification.delivery";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub keyword_directory_url: Option<String>,
    pub keyword_directory_timeout_sec: u64,
    pub worker_id: u64,
    pub datacenter_id: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub keyword_directory_url: Option<String>,
    pub keyword_directory_timeout_sec: u64,

    // Feature configs (with defaults)
    pub stream: StreamSettings,
    pub delivery: DeliverySettings,
    pub buffer: BufferSettings,
    pub sse: SseSettings,
    pub snowflake: SnowflakeSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let keyword_directory_url = file
            .keyword_directory_url
            .or_else(|| cli.keyword_directory_url.clone());
        let keyword_directory_timeout_sec = file
            .keyword_directory_timeout_sec
            .unwrap_or(cli.keyword_directory_timeout_sec);

        let stream_file = file.stream.unwrap_or_default();
        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            content_topic: stream_file
                .content_topic
                .unwrap_or(stream_defaults.content_topic),
            notification_topic: stream_file
                .notification_topic
                .unwrap_or(stream_defaults.notification_topic),
            content_group_id: stream_file
                .content_group_id
                .unwrap_or(stream_defaults.content_group_id),
            notification_group_id: stream_file
                .notification_group_id
                .unwrap_or(stream_defaults.notification_group_id),
            dlt_suffix: stream_file.dlt_suffix.unwrap_or(stream_defaults.dlt_suffix),
            poll_batch_size: stream_file
                .poll_batch_size
                .unwrap_or(stream_defaults.poll_batch_size),
            poll_interval_ms: stream_file
                .poll_interval_ms
                .unwrap_or(stream_defaults.poll_interval_ms),
            retention_hours: stream_file
                .retention_hours
                .unwrap_or(stream_defaults.retention_hours),
            prune_interval_minutes: stream_file
                .prune_interval_minutes
                .unwrap_or(stream_defaults.prune_interval_minutes),
        };
        if stream.poll_batch_size == 0 {
            bail!("stream.poll_batch_size must be greater than 0");
        }
        if stream.dlt_suffix.is_empty() {
            bail!("stream.dlt_suffix must not be empty");
        }

        let delivery_file = file.delivery.unwrap_or_default();
        let delivery_defaults = DeliverySettings::default();
        let delivery = DeliverySettings {
            max_attempts: delivery_file
                .max_attempts
                .unwrap_or(delivery_defaults.max_attempts),
            initial_backoff_ms: delivery_file
                .initial_backoff_ms
                .unwrap_or(delivery_defaults.initial_backoff_ms),
            max_backoff_ms: delivery_file
                .max_backoff_ms
                .unwrap_or(delivery_defaults.max_backoff_ms),
            backoff_multiplier: delivery_file
                .backoff_multiplier
                .unwrap_or(delivery_defaults.backoff_multiplier),
        };
        if delivery.max_attempts == 0 {
            bail!("delivery.max_attempts must be at least 1");
        }
        if delivery.backoff_multiplier < 1.0 {
            bail!(
                "delivery.backoff_multiplier must be >= 1.0, got {}",
                delivery.backoff_multiplier
            );
        }

        let buffer_file = file.buffer.unwrap_or_default();
        let buffer = BufferSettings {
            batch_size: buffer_file
                .batch_size
                .unwrap_or(BufferSettings::default().batch_size),
            flush_interval_ms: buffer_file
                .flush_interval_ms
                .unwrap_or(BufferSettings::default().flush_interval_ms),
        };
        if buffer.batch_size == 0 {
            bail!("buffer.batch_size must be greater than 0");
        }
        if buffer.flush_interval_ms == 0 {
            bail!("buffer.flush_interval_ms must be greater than 0");
        }

        let sse_file = file.sse.unwrap_or_default();
        let sse = SseSettings {
            max_connection_secs: sse_file
                .max_connection_secs
                .unwrap_or(SseSettings::default().max_connection_secs),
            keep_alive_secs: sse_file
                .keep_alive_secs
                .unwrap_or(SseSettings::default().keep_alive_secs),
        };

        let snowflake_file = file.snowflake.unwrap_or_default();
        let snowflake = SnowflakeSettings {
            worker_id: snowflake_file.worker_id.unwrap_or(cli.worker_id),
            datacenter_id: snowflake_file.datacenter_id.unwrap_or(cli.datacenter_id),
        };
        if snowflake.worker_id > MAX_WORKER_ID {
            bail!(
                "snowflake worker_id must be in 0..={}, got {}",
                MAX_WORKER_ID,
                snowflake.worker_id
            );
        }
        if snowflake.datacenter_id > MAX_DATACENTER_ID {
            bail!(
                "snowflake datacenter_id must be in 0..={}, got {}",
                MAX_DATACENTER_ID,
                snowflake.datacenter_id
            );
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            keyword_directory_url,
            keyword_directory_timeout_sec,
            stream,
            delivery,
            buffer,
            sse,
            snowflake,
        })
    }

    pub fn notifications_db_path(&self) -> PathBuf {
        self.db_dir.join("notifications.db")
    }

    pub fn stream_db_path(&self) -> PathBuf {
        self.db_dir.join("stream.db")
    }
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub content_topic: String,
    pub notification_topic: String,
    pub content_group_id: String,
    pub notification_group_id: String,
    pub dlt_suffix: String,
    pub poll_batch_size: usize,
    pub poll_interval_ms: u64,
    pub retention_hours: u64,
    pub prune_interval_minutes: u64,
}

impl StreamSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            content_topic: DEFAULT_CONTENT_TOPIC.to_string(),
            notification_topic: DEFAULT_NOTIFICATION_TOPIC.to_string(),
            content_group_id: DEFAULT_CONTENT_GROUP_ID.to_string(),
            notification_group_id: DEFAULT_NOTIFICATION_GROUP_ID.to_string(),
            dlt_suffix: DEFAULT_DLT_SUFFIX.to_string(),
            poll_batch_size: 100,
            poll_interval_ms: 200,
            retention_hours: 7 * 24,
            prune_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl BufferSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SseSettings {
    pub max_connection_secs: u64,
    pub keep_alive_secs: u64,
}

impl SseSettings {
    pub fn max_connection_duration(&self) -> Duration {
        Duration::from_secs(self.max_connection_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            max_connection_secs: 60 * 60,
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnowflakeSettings {
    pub worker_id: u64,
    pub datacenter_id: u64,
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
