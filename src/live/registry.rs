//! Live connection registry.
//!
//! Tracks every open SSE connection, organized by user, and broadcasts to
//! all connections of a user. A connection whose receiver is gone is removed
//! as soon as a push to it fails.

use dashmap::DashMap;
use prometheus::Gauge;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::SseMessage;
use crate::server::metrics;

/// Identifies one live connection. Lookups by user compare `user_id` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub user_id: i64,
    pub connection_id: u64,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user_id, self.connection_id)
    }
}

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<SseMessage>,
    /// Unix millis.
    established_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// user_id -> (connection_id -> entry)
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<i64, HashMap<u64, ConnectionEntry>>>,
    next_connection_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    live_gauge: Gauge,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_gauge(metrics::LIVE_CONNECTIONS.clone())
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry reporting its open connections on `live_gauge`.
    pub fn with_gauge(live_gauge: Gauge) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            next_connection_id: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            live_gauge,
        }
    }

    /// Register a new connection for `user_id`.
    ///
    /// Returns the connection key and the receiver the transport should drain.
    /// After [`close_all`](Self::close_all) the receiver is already closed.
    pub fn register(&self, user_id: i64) -> (ConnectionKey, mpsc::UnboundedReceiver<SseMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = ConnectionKey {
            user_id,
            connection_id: self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1,
        };

        {
            // The flag is read under the shard lock so close_all cannot miss this entry
            let mut user_conns = self.connections.entry(user_id).or_default();
            if !self.closed.load(Ordering::SeqCst) {
                user_conns.insert(
                    key.connection_id,
                    ConnectionEntry {
                        sender: tx,
                        established_at: chrono::Utc::now().timestamp_millis(),
                    },
                );
                self.live_gauge.inc();
                return (key, rx);
            }
        }

        self.connections
            .remove_if(&user_id, |_, user_conns| user_conns.is_empty());
        (key, rx)
    }

    /// Remove a connection. Returns false if it was already gone.
    pub fn remove(&self, key: &ConnectionKey) -> bool {
        let removed = match self.connections.get_mut(&key.user_id) {
            Some(mut user_conns) => user_conns.remove(&key.connection_id).is_some(),
            None => false,
        };
        self.connections
            .remove_if(&key.user_id, |_, user_conns| user_conns.is_empty());
        if removed {
            self.live_gauge.dec();
        }
        removed
    }

    /// Drop every connection and refuse new ones. Each receiver yields `None`
    /// once it has drained what was already pushed. Returns how many were open.
    pub fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let mut closed = 0;
        self.connections.retain(|_, user_conns| {
            closed += user_conns.len();
            false
        });
        self.live_gauge.sub(closed as f64);
        closed
    }

    /// Push a message to every connection of `user_id`.
    ///
    /// Connections that fail are removed; the others still receive the message.
    pub fn broadcast_to_user(&self, user_id: i64, message: &SseMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        if let Some(mut user_conns) = self.connections.get_mut(&user_id) {
            user_conns.retain(|_, entry| {
                if entry.sender.send(message.clone()).is_ok() {
                    report.delivered += 1;
                    true
                } else {
                    report.failed += 1;
                    false
                }
            });
        }

        if report.failed > 0 {
            self.connections
                .remove_if(&user_id, |_, user_conns| user_conns.is_empty());
            self.live_gauge.sub(report.failed as f64);
        }
        report
    }

    /// When the connection was established, in unix millis.
    pub fn established_at(&self, key: &ConnectionKey) -> Option<i64> {
        self.connections
            .get(&key.user_id)
            .and_then(|user_conns| user_conns.get(&key.connection_id).map(|e| e.established_at))
    }

    #[cfg(test)]
    pub fn is_connected(&self, key: &ConnectionKey) -> bool {
        self.established_at(key).is_some()
    }

    /// Number of open connections of one user.
    #[cfg(test)]
    pub fn user_connection_count(&self, user_id: i64) -> usize {
        self.connections
            .get(&user_id)
            .map(|user_conns| user_conns.len())
            .unwrap_or(0)
    }

    /// Total number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|user_conns| user_conns.len()).sum()
    }
}
