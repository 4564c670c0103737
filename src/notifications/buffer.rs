//! Write-back buffer between live delivery and the notification table.
//!
//! Events are enqueued on the delivery path and persisted later in bounded
//! batches. A failed batch is logged and dropped: live delivery already
//! happened, and the durable copy only serves replay and history.

use crossbeam_queue::SegQueue;
use std::sync::Arc;
use tracing::{debug, error};

use super::models::NotificationEvent;
use super::store::NotificationWriter;
use crate::server::metrics;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Result of one flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty, the writer was not called.
    Idle,
    /// The batch was written. Carries the number of drained events.
    Persisted(usize),
    /// The writer failed and the batch is lost.
    Dropped(usize),
}

pub struct WriteBackBuffer {
    queue: SegQueue<NotificationEvent>,
    batch_size: usize,
    writer: Arc<dyn NotificationWriter>,
}

impl WriteBackBuffer {
    pub fn new(writer: Arc<dyn NotificationWriter>, batch_size: usize) -> Self {
        Self {
            queue: SegQueue::new(),
            batch_size: batch_size.max(1),
            writer,
        }
    }

    pub fn enqueue(&self, event: NotificationEvent) {
        self.queue.push(event);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drain up to `batch_size` events and write them with one flush-time timestamp.
    pub fn flush(&self) -> FlushOutcome {
        let mut batch = Vec::with_capacity(self.batch_size.min(self.queue.len()));
        while batch.len() < self.batch_size {
            match self.queue.pop() {
                Some(event) => batch.push(event),
                None => break,
            }
        }

        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let created_at = chrono::Utc::now().timestamp_millis();
        match self.writer.insert_batch(&batch, created_at) {
            Ok(inserted) => {
                debug!(
                    "Flushed {} notifications ({} new rows)",
                    batch.len(),
                    inserted
                );
                metrics::record_flush("persisted", inserted);
                FlushOutcome::Persisted(batch.len())
            }
            Err(e) => {
                let ids: Vec<i64> = batch.iter().map(|e| e.notification_id).collect();
                error!(
                    "Failed to persist {} notifications, batch dropped: {:#} (ids: {:?})",
                    batch.len(),
                    e,
                    ids
                );
                metrics::record_flush("dropped", 0);
                FlushOutcome::Dropped(batch.len())
            }
        }
    }

    /// Flush until the queue is empty. Used on shutdown.
    pub fn drain(&self) -> usize {
        let mut flushed = 0;
        loop {
            match self.flush() {
                FlushOutcome::Idle => return flushed,
                FlushOutcome::Persisted(n) | FlushOutcome::Dropped(n) => flushed += n,
            }
        }
    }
}
