//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all notification-server endpoints.
//!
//! When API routes or request formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

const USER_ID_HEADER: &str = "X-User-Id";

/// HTTP test client. The caller identity travels in the `X-User-Id` header,
/// as set by the gateway in production.
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Server Info
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// GET /api/notifications
    pub async fn get_history(
        &self,
        user_id: i64,
        last_id: Option<i64>,
        size: Option<usize>,
    ) -> Response {
        let mut query = Vec::new();
        if let Some(last_id) = last_id {
            query.push(("lastId", last_id.to_string()));
        }
        if let Some(size) = size {
            query.push(("size", size.to_string()));
        }

        self.client
            .get(format!("{}/api/notifications", self.base_url))
            .header(USER_ID_HEADER, user_id.to_string())
            .query(&query)
            .send()
            .await
            .expect("History request failed")
    }

    /// GET /api/notifications without the user id header
    pub async fn get_history_anonymous(&self) -> Response {
        self.client
            .get(format!("{}/api/notifications", self.base_url))
            .send()
            .await
            .expect("History request failed")
    }

    /// PATCH /api/notifications/{id}/read
    pub async fn mark_as_read(&self, user_id: i64, notification_id: i64) -> Response {
        self.client
            .patch(format!(
                "{}/api/notifications/{}/read",
                self.base_url, notification_id
            ))
            .header(USER_ID_HEADER, user_id.to_string())
            .send()
            .await
            .expect("Mark as read request failed")
    }

    /// GET /api/notifications/unread-count
    pub async fn get_unread_count(&self, user_id: i64) -> Response {
        self.client
            .get(format!("{}/api/notifications/unread-count", self.base_url))
            .header(USER_ID_HEADER, user_id.to_string())
            .send()
            .await
            .expect("Unread count request failed")
    }

    // ========================================================================
    // Live Stream
    // ========================================================================

    /// GET /api/notifications/subscribe, returning the raw response
    pub async fn subscribe_raw(&self, user_id: Option<i64>, last_event_id: Option<&str>) -> Response {
        let mut request = self
            .client
            .get(format!("{}/api/notifications/subscribe", self.base_url))
            // The stream outlives the default request timeout
            .timeout(Duration::from_secs(3600));
        if let Some(user_id) = user_id {
            request = request.header(USER_ID_HEADER, user_id.to_string());
        }
        if let Some(last_event_id) = last_event_id {
            request = request.header("Last-Event-ID", last_event_id);
        }
        request.send().await.expect("Subscribe request failed")
    }

    /// Opens a live stream and returns a reader positioned before the first event.
    ///
    /// # Panics
    ///
    /// Panics if the server does not answer with 200.
    pub async fn subscribe(&self, user_id: i64, last_event_id: Option<&str>) -> SseReader {
        let response = self.subscribe_raw(Some(user_id), last_event_id).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Subscribe failed for user {}",
            user_id
        );
        SseReader::new(response)
    }

    // ========================================================================
    // Internal Ingestion
    // ========================================================================

    /// POST /internal/contents
    pub async fn ingest_content(
        &self,
        source_id: i64,
        title: &str,
        summary: Option<&str>,
        original_url: Option<&str>,
    ) -> Response {
        self.client
            .post(format!("{}/internal/contents", self.base_url))
            .json(&json!({
                "sourceId": source_id,
                "contentId": 42,
                "title": title,
                "summary": summary,
                "originalUrl": original_url,
            }))
            .send()
            .await
            .expect("Ingest request failed")
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.data).expect("SSE data is not JSON")
    }
}

/// Incremental reader of a `text/event-stream` body.
pub struct SseReader {
    chunks: BoxStream<'static, reqwest::Result<String>>,
    pending: String,
}

impl SseReader {
    fn new(response: Response) -> Self {
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
            .boxed();
        Self {
            chunks,
            pending: String::new(),
        }
    }

    /// Next event, skipping keep-alive comments. `None` when the stream ended
    /// or nothing arrived within the SSE timeout.
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        self.next_event_within(Duration::from_secs(SSE_EVENT_TIMEOUT_SECS))
            .await
    }

    pub async fn next_event_within(&mut self, timeout: Duration) -> Option<SseEvent> {
        tokio::time::timeout(timeout, self.read_event())
            .await
            .ok()
            .flatten()
    }

    async fn read_event(&mut self) -> Option<SseEvent> {
        loop {
            while let Some(end) = self.pending.find("\n\n") {
                let frame: String = self.pending.drain(..end + 2).collect();
                if let Some(event) = parse_frame(&frame) {
                    return Some(event);
                }
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.pending.push_str(&chunk.replace("\r\n", "\n")),
                _ => return None,
            }
        }
    }
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut id = None;
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "id" => id = Some(value.to_string()),
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if id.is_none() && event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent {
        id,
        event,
        data: data.join("\n"),
    })
}
