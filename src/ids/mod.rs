//! Time-ordered unique id generation.

mod snowflake;

pub use snowflake::{SnowflakeIdGenerator, MAX_DATACENTER_ID, MAX_WORKER_ID};
