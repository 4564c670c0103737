//! Shared constants for end-to-end tests
//!
//! When the keyword directory fixture changes, update only this file.

#![allow(dead_code)]

// ============================================================================
// Keyword Directory Fixture
// ============================================================================

/// Subscribed to "Spring"
pub const SUBSCRIBER_1: i64 = 1;

/// Subscribed to "Spring" and "Kafka"
pub const SUBSCRIBER_2: i64 = 2;

/// Subscribed to "Rust"
pub const SUBSCRIBER_3: i64 = 3;

/// Not subscribed to anything
pub const NON_SUBSCRIBER: i64 = 10;

/// Keyword subscriptions served by the fake directory
pub const KEYWORD_SUBSCRIPTIONS: &[(&str, &[i64])] = &[
    ("Spring", &[SUBSCRIBER_1, SUBSCRIBER_2]),
    ("Kafka", &[SUBSCRIBER_2]),
    ("Rust", &[SUBSCRIBER_3]),
];

/// Source id for which the fake directory fails with 503
pub const FAILING_SOURCE_ID: i64 = 666;

// ============================================================================
// Timeouts
// ============================================================================

/// Timeout for individual HTTP requests
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Maximum time to wait for a pushed SSE event
pub const SSE_EVENT_TIMEOUT_SECS: u64 = 5;

/// Maximum time to wait for asynchronous pipeline effects
pub const PIPELINE_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Pipeline Tuning
// ============================================================================

/// Poll and flush quickly so tests do not wait on production intervals
pub const TEST_POLL_INTERVAL_MS: u64 = 20;
pub const TEST_FLUSH_INTERVAL_MS: u64 = 20;
pub const TEST_INITIAL_BACKOFF_MS: u64 = 10;
pub const TEST_KEEP_ALIVE_SECS: u64 = 1;
