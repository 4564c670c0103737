//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, SUBSCRIBER_1};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_history() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.get_history(SUBSCRIBER_1, None, None).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod directory;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{SseEvent, SseReader, TestClient};
pub use constants::*;
pub use server::TestServer;
