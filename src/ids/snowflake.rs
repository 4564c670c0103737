//! Snowflake-style id generator.
//!
//! Layout of a generated id (most significant bit first):
//!
//! ```text
//! | 1 bit unused | 41 bits millis since EPOCH | 5 bits datacenter | 5 bits worker | 12 bits sequence |
//! ```
//!
//! Ids minted by one generator are strictly increasing. When the sequence for a
//! millisecond is exhausted, or the wall clock moves backwards, the generator
//! keeps counting on a logical clock that runs ahead of the wall clock until the
//! wall clock catches up.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// 2020-01-01T00:00:00Z in millis.
const EPOCH_MILLIS: u64 = 1_577_836_800_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_BITS: u32 = 5;
const DATACENTER_BITS: u32 = 5;

const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_WORKER_ID: u64 = (1 << WORKER_BITS) - 1;
pub const MAX_DATACENTER_ID: u64 = (1 << DATACENTER_BITS) - 1;

const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS + DATACENTER_BITS;

pub struct SnowflakeIdGenerator {
    node_bits: u64,
    /// Packed `(elapsed_millis << SEQUENCE_BITS) | sequence` of the last minted id.
    last: AtomicU64,
}

impl SnowflakeIdGenerator {
    pub fn new(worker_id: u64, datacenter_id: u64) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            bail!("worker_id must be in 0..={}, got {}", MAX_WORKER_ID, worker_id);
        }
        if datacenter_id > MAX_DATACENTER_ID {
            bail!(
                "datacenter_id must be in 0..={}, got {}",
                MAX_DATACENTER_ID,
                datacenter_id
            );
        }
        Ok(Self {
            node_bits: (datacenter_id << DATACENTER_SHIFT) | (worker_id << WORKER_SHIFT),
            last: AtomicU64::new(0),
        })
    }

    /// Mint the next id.
    pub fn next_id(&self) -> i64 {
        let now = Self::elapsed_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let last_millis = current >> SEQUENCE_BITS;
            let last_sequence = current & SEQUENCE_MASK;

            let next = if now > last_millis {
                now << SEQUENCE_BITS
            } else if last_sequence < SEQUENCE_MASK {
                current + 1
            } else {
                (last_millis + 1) << SEQUENCE_BITS
            };

            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return self.compose(next),
                Err(actual) => current = actual,
            }
        }
    }

    fn compose(&self, packed: u64) -> i64 {
        let millis = packed >> SEQUENCE_BITS;
        let sequence = packed & SEQUENCE_MASK;
        ((millis << TIMESTAMP_SHIFT) | self.node_bits | sequence) as i64
    }

    fn elapsed_millis() -> u64 {
        (chrono::Utc::now().timestamp_millis() as u64).saturating_sub(EPOCH_MILLIS)
    }

    /// Creation time, in unix millis, encoded in an id minted by any generator.
    #[cfg(test)]
    pub fn timestamp_of(id: i64) -> i64 {
        ((id as u64 >> TIMESTAMP_SHIFT) + EPOCH_MILLIS) as i64
    }
}
