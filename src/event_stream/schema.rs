use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP_MILLIS,
};

/// Append-only log shared by every topic. The rowid alias doubles as the offset.
const STREAM_RECORDS_TABLE_V1: Table = Table {
    name: "stream_records",
    columns: &[
        sqlite_column!("record_offset", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("topic", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!(
            "published_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP_MILLIS)
        ),
    ],
    indices: &[("idx_stream_records_topic", "topic, record_offset")],
    unique_constraints: &[],
};

/// Last processed offset per (topic, consumer group).
const CONSUMER_OFFSETS_TABLE_V1: Table = Table {
    name: "consumer_offsets",
    columns: &[
        sqlite_column!("topic", &SqlType::Text, non_null = true),
        sqlite_column!("group_id", &SqlType::Text, non_null = true),
        sqlite_column!("committed_offset", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["topic", "group_id"]],
};

pub const STREAM_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[STREAM_RECORDS_TABLE_V1, CONSUMER_OFFSETS_TABLE_V1],
    migration: None,
}];
