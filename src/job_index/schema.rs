//! SQLite schema for the job index database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// One row per engine job. Timestamps are fixed-width RFC 3339 text.
const JOB_INDEX_TABLE_V1: Table = Table {
    name: "job_index",
    columns: &[
        sqlite_column!("job_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("org_slug", &SqlType::Text, non_null = true),
        sqlite_column!("ds_slug", &SqlType::Text, non_null = true),
        sqlite_column!("path", &SqlType::Text),
        sqlite_column!("user_id", &SqlType::Text),
        sqlite_column!("queue", &SqlType::Text),
        sqlite_column!("created_at_utc", &SqlType::Text, non_null = true),
        sqlite_column!("last_state_change_utc", &SqlType::Text, non_null = true),
        sqlite_column!("current_state", &SqlType::Text, non_null = true),
        sqlite_column!("processing_at_utc", &SqlType::Text),
        sqlite_column!("succeeded_at_utc", &SqlType::Text),
        sqlite_column!("failed_at_utc", &SqlType::Text),
        sqlite_column!("deleted_at_utc", &SqlType::Text),
        sqlite_column!("scheduled_at_utc", &SqlType::Text),
        sqlite_column!("method_display", &SqlType::Text),
    ],
    indices: &[
        ("idx_job_index_org_ds_created", "org_slug, ds_slug, created_at_utc DESC"),
        ("idx_job_index_state", "current_state"),
        ("idx_job_index_last_change", "last_state_change_utc"),
    ],
    unique_constraints: &[],
};

pub const JOB_INDEX_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[JOB_INDEX_TABLE_V1],
    migration: None,
}];
