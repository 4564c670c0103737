use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub keyword_directory_url: Option<String>,
    pub keyword_directory_timeout_sec: Option<u64>,

    // Feature configs
    pub stream: Option<StreamConfig>,
    pub delivery: Option<DeliveryConfig>,
    pub buffer: Option<BufferConfig>,
    pub sse: Option<SseConfig>,
    pub snowflake: Option<SnowflakeConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub content_topic: Option<String>,
    pub notification_topic: Option<String>,
    pub content_group_id: Option<String>,
    pub notification_group_id: Option<String>,
    pub dlt_suffix: Option<String>,
    pub poll_batch_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    /// Set to 0 to disable pruning.
    pub retention_hours: Option<u64>,
    pub prune_interval_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BufferConfig {
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SseConfig {
    pub max_connection_secs: Option<u64>,
    pub keep_alive_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SnowflakeConfig {
    pub worker_id: Option<u64>,
    pub datacenter_id: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections() {
        let config: FileConfig = toml::from_str(
            r#"
            db_dir = "/data"
            port = 8080
            keyword_directory_url = "http://identity:8080"

            [stream]
            content_topic = "content.crawled"
            retention_hours = 0

            [buffer]
            batch_size = 200

            [snowflake]
            worker_id = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.db_dir.as_deref(), Some("/data"));
        assert_eq!(config.port, Some(8080));
        let stream = config.stream.unwrap();
        assert_eq!(stream.content_topic.as_deref(), Some("content.crawled"));
        assert_eq!(stream.retention_hours, Some(0));
        assert_eq!(config.buffer.unwrap().batch_size, Some(200));
        assert_eq!(config.snowflake.unwrap().worker_id, Some(3));
        assert!(config.sse.is_none());
    }

    #[test]
    fn empty_file_is_valid() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.delivery.is_none());
    }
}
