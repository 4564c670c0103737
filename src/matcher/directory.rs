//! Client for the external keyword directory: who subscribes to which keywords.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

#[async_trait]
pub trait KeywordDirectory: Send + Sync {
    /// Ids of the users subscribed to any of `keywords` for the given source.
    async fn find_subscribers(&self, keywords: &BTreeSet<String>, source_id: i64)
        -> Result<Vec<i64>>;
}

pub struct HttpKeywordDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKeywordDirectory {
    /// # Arguments
    /// * `base_url` - Base URL of the directory service (e.g., "http://identity:8080")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl KeywordDirectory for HttpKeywordDirectory {
    async fn find_subscribers(
        &self,
        keywords: &BTreeSet<String>,
        source_id: i64,
    ) -> Result<Vec<i64>> {
        let url = format!("{}/internal/keywords/match-users", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("sourceId", source_id)])
            .json(keywords)
            .send()
            .await
            .context("Failed to connect to keyword directory")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Keyword directory lookup for source {} failed with status: {}",
                source_id,
                response.status()
            );
        }

        response
            .json()
            .await
            .context("Failed to parse keyword directory response")
    }
}
