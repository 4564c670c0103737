//! Periodic flush loop for the write-back buffer.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::buffer::{FlushOutcome, WriteBackBuffer};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Runs `WriteBackBuffer::flush` on a fixed delay until stopped.
pub struct FlushScheduler {
    buffer: Arc<WriteBackBuffer>,
    shutdown_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl FlushScheduler {
    pub fn start(buffer: Arc<WriteBackBuffer>, interval: Duration) -> Self {
        let shutdown_token = CancellationToken::new();
        let loop_buffer = buffer.clone();
        let loop_token = shutdown_token.clone();

        info!(
            "Starting notification flush loop (interval {:?}, batch size {})",
            interval,
            buffer.batch_size()
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let buffer = loop_buffer.clone();
                        match tokio::task::spawn_blocking(move || buffer.flush()).await {
                            Ok(FlushOutcome::Dropped(n)) => {
                                warn!("Flush dropped {} notifications", n);
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!("Flush task panicked: {}", e);
                            }
                        }
                    }
                    _ = loop_token.cancelled() => {
                        break;
                    }
                }
            }
        });

        Self {
            buffer,
            shutdown_token,
            handle,
        }
    }

    /// Stop the loop and persist whatever is still queued.
    pub async fn stop(self) {
        info!(
            "Stopping flush loop with {} notifications queued",
            self.buffer.pending()
        );
        self.shutdown_token.cancel();
        if let Err(e) = self.handle.await {
            error!("Flush loop ended abnormally: {}", e);
        }

        let buffer = self.buffer.clone();
        match tokio::task::spawn_blocking(move || buffer.drain()).await {
            Ok(drained) => info!("Flush loop stopped, drained {} notifications", drained),
            Err(e) => error!("Final drain panicked: {}", e),
        }
    }
}
