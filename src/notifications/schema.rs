//! SQLite schema definitions for the notification database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Notification rows
// =============================================================================

/// Notifications table, one row per delivered notification.
/// `notification_id` is minted upstream (snowflake) and doubles as the sort key.
const NOTIFICATION_TABLE_V1: Table = Table {
    name: "notification",
    columns: &[
        sqlite_column!("notification_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("content_id", &SqlType::Integer),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("original_url", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "is_read",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_notification_user_id", "user_id, notification_id")],
    unique_constraints: &[],
};

pub const NOTIFICATION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[NOTIFICATION_TABLE_V1],
    migration: None,
}];
