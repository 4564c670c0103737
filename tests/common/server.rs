//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases, its own
//! background pipeline and its own fake keyword directory.

use super::constants::*;
use super::directory::spawn_keyword_directory;
use notification_server::config::{
    AppConfig, BufferConfig, CliConfig, DeliveryConfig, FileConfig, SseConfig, StreamConfig,
};
use notification_server::event_stream::EventStream;
use notification_server::notifications::NotificationStore;
use notification_server::server::{make_app, RequestsLoggingLevel};
use notification_server::{BackgroundTasks, NotificationApp};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases
///
/// When dropped, the server and the fake directory shut down and temp
/// resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Event stream for publishing records directly in tests
    pub stream: Arc<dyn EventStream>,

    /// Notification store for direct database access in tests
    pub store: Arc<dyn NotificationStore>,

    // Private fields - keep resources alive until drop
    background: Option<BackgroundTasks>,
    _temp_db_dir: TempDir,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the databases cannot be created, the port cannot be bound
    /// or the server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        let shutdown_token = CancellationToken::new();
        let directory_url = spawn_keyword_directory(shutdown_token.clone()).await;

        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let cli = CliConfig {
            db_dir: Some(temp_db_dir.path().to_path_buf()),
            port,
            metrics_port: 0,
            logging_level: RequestsLoggingLevel::None,
            keyword_directory_url: Some(directory_url),
            keyword_directory_timeout_sec: REQUEST_TIMEOUT_SECS,
            worker_id: 1,
            datacenter_id: 1,
        };
        let file = FileConfig {
            stream: Some(StreamConfig {
                poll_interval_ms: Some(TEST_POLL_INTERVAL_MS),
                retention_hours: Some(0),
                ..Default::default()
            }),
            delivery: Some(DeliveryConfig {
                initial_backoff_ms: Some(TEST_INITIAL_BACKOFF_MS),
                max_backoff_ms: Some(TEST_INITIAL_BACKOFF_MS * 4),
                ..Default::default()
            }),
            buffer: Some(BufferConfig {
                flush_interval_ms: Some(TEST_FLUSH_INTERVAL_MS),
                ..Default::default()
            }),
            // Closed clients are only noticed on the next write
            sse: Some(SseConfig {
                keep_alive_secs: Some(TEST_KEEP_ALIVE_SECS),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file)).expect("Failed to resolve config");

        let app = NotificationApp::open(config).expect("Failed to open app");
        let background = app.start_background();
        let router = make_app(app.server_state("test"));

        let server_token = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_token.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            stream: app.stream(),
            store: app.store(),
            background: Some(background),
            _temp_db_dir: temp_db_dir,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Stops the consumers and drains the write-back buffer.
    pub async fn stop_background(&mut self) {
        if let Some(background) = self.background.take() {
            background.shutdown().await;
        }
    }

    /// Polls `check` until it returns true or the pipeline timeout elapses.
    pub async fn wait_until<F: Fn() -> bool>(&self, check: F) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(PIPELINE_TIMEOUT_MS) {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(TEST_POLL_INTERVAL_MS)).await;
        }
        check()
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        // Background loops end with the test runtime
    }
}
