use super::models::{IndexPayload, JobIndex, UNKNOWN_SLUG};
use super::schema::JOB_INDEX_VERSIONED_SCHEMAS;
use super::JobIndexStore;
use crate::background_jobs::JobState;
use crate::sqlite_persistence::{format_timestamp, lock_conn, open_versioned_db, parse_timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "job_id, org_slug, ds_slug, path, user_id, queue, created_at_utc, \
     last_state_change_utc, current_state, processing_at_utc, succeeded_at_utc, failed_at_utc, \
     deleted_at_utc, scheduled_at_utc, method_display";

const TERMINAL_STATES_SQL: &str = "('Succeeded', 'Failed', 'Deleted')";

pub struct SqliteJobIndexStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobIndexStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), JOB_INDEX_VERSIONED_SCHEMAS, "job index")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Column that records the first time `state` was reached, if any.
    fn state_timestamp_column(state: JobState) -> Option<&'static str> {
        match state {
            JobState::Processing => Some("processing_at_utc"),
            JobState::Succeeded => Some("succeeded_at_utc"),
            JobState::Failed => Some("failed_at_utc"),
            JobState::Deleted => Some("deleted_at_utc"),
            JobState::Scheduled => Some("scheduled_at_utc"),
            _ => None,
        }
    }

    fn row_to_job_index(row: &rusqlite::Row) -> rusqlite::Result<JobIndex> {
        let required = |column: &str| -> rusqlite::Result<DateTime<Utc>> {
            let raw: String = row.get(column)?;
            parse_timestamp(&raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    row.as_ref().column_index(column).unwrap_or(0),
                    rusqlite::types::Type::Text,
                    format!("invalid {} timestamp: {:?}", column, raw).into(),
                )
            })
        };
        let optional = |s: Option<String>| s.as_deref().and_then(parse_timestamp);

        Ok(JobIndex {
            job_id: row.get("job_id")?,
            org_slug: row.get("org_slug")?,
            ds_slug: row.get("ds_slug")?,
            path: row.get("path")?,
            user_id: row.get("user_id")?,
            queue: row.get("queue")?,
            created_at_utc: required("created_at_utc")?,
            last_state_change_utc: required("last_state_change_utc")?,
            current_state: row.get("current_state")?,
            processing_at_utc: optional(row.get("processing_at_utc")?),
            succeeded_at_utc: optional(row.get("succeeded_at_utc")?),
            failed_at_utc: optional(row.get("failed_at_utc")?),
            deleted_at_utc: optional(row.get("deleted_at_utc")?),
            scheduled_at_utc: optional(row.get("scheduled_at_utc")?),
            method_display: row.get("method_display")?,
        })
    }

    fn query_rows<P: rusqlite::Params>(&self, where_clause: &str, params: P) -> Result<Vec<JobIndex>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_index {}",
            SELECT_COLUMNS, where_clause
        ))?;
        let rows = stmt
            .query_map(params, Self::row_to_job_index)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Escape LIKE wildcards so a path prefix matches literally.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl JobIndexStore for SqliteJobIndexStore {
    fn upsert_on_enqueue(
        &self,
        job_id: &str,
        payload: &IndexPayload,
        method_display: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        let created_at = format_timestamp(&created_at);
        // On conflict the row was synthesized by an earlier transition, so
        // only the metadata is refreshed and the observed state is kept.
        conn.execute(
            "INSERT INTO job_index (job_id, org_slug, ds_slug, path, user_id, queue,
                created_at_utc, last_state_change_utc, current_state, method_display)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9)
             ON CONFLICT(job_id) DO UPDATE SET
                org_slug = excluded.org_slug,
                ds_slug = excluded.ds_slug,
                path = excluded.path,
                user_id = excluded.user_id,
                queue = COALESCE(excluded.queue, job_index.queue),
                method_display = COALESCE(excluded.method_display, job_index.method_display),
                created_at_utc = MIN(job_index.created_at_utc, excluded.created_at_utc)",
            params![
                job_id,
                payload.org_slug,
                payload.ds_slug,
                payload.path,
                payload.user_id,
                payload.queue,
                created_at,
                JobState::Created.as_str(),
                method_display,
            ],
        )
        .with_context(|| format!("Failed to upsert job index row for job {}", job_id))?;
        Ok(())
    }

    fn update_state(&self, job_id: &str, state: JobState, changed_at: DateTime<Utc>) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        let changed_at = format_timestamp(&changed_at);

        let exists = conn
            .query_row(
                "SELECT 1 FROM job_index WHERE job_id = ?1",
                params![job_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if !exists {
            info!(
                "Synthesizing job index row for unseen job {} in state {}",
                job_id, state
            );
            conn.execute(
                "INSERT INTO job_index (job_id, org_slug, ds_slug, created_at_utc,
                    last_state_change_utc, current_state)
                 VALUES (?1, ?2, ?2, ?3, ?3, ?4)",
                params![job_id, UNKNOWN_SLUG, changed_at, state.as_str()],
            )?;
        } else {
            conn.execute(
                "UPDATE job_index SET current_state = ?2, last_state_change_utc = ?3
                 WHERE job_id = ?1",
                params![job_id, state.as_str(), changed_at],
            )?;
        }

        if let Some(column) = Self::state_timestamp_column(state) {
            conn.execute(
                &format!(
                    "UPDATE job_index SET {column} = ?2 WHERE job_id = ?1 AND {column} IS NULL"
                ),
                params![job_id, changed_at],
            )?;
        }
        debug!("Job index: {} -> {}", job_id, state);
        Ok(())
    }

    fn get(&self, job_id: &str) -> Result<Option<JobIndex>> {
        Ok(self
            .query_rows("WHERE job_id = ?1", params![job_id])?
            .into_iter()
            .next())
    }

    fn get_by_org_ds(
        &self,
        org_slug: &str,
        ds_slug: &str,
        skip: usize,
        take: usize,
    ) -> Result<Vec<JobIndex>> {
        self.query_rows(
            "WHERE org_slug = ?1 AND ds_slug = ?2
             ORDER BY created_at_utc DESC, job_id DESC LIMIT ?3 OFFSET ?4",
            params![org_slug, ds_slug, take as i64, skip as i64],
        )
    }

    fn get_by_org_ds_path(
        &self,
        org_slug: &str,
        ds_slug: &str,
        path: &str,
        prefix: bool,
    ) -> Result<Vec<JobIndex>> {
        if prefix {
            let pattern = format!("{}%", escape_like(path));
            self.query_rows(
                "WHERE org_slug = ?1 AND ds_slug = ?2 AND path LIKE ?3 ESCAPE '\\'
                 ORDER BY created_at_utc DESC, job_id DESC",
                params![org_slug, ds_slug, pattern],
            )
        } else {
            self.query_rows(
                "WHERE org_slug = ?1 AND ds_slug = ?2 AND path = ?3
                 ORDER BY created_at_utc DESC, job_id DESC",
                params![org_slug, ds_slug, path],
            )
        }
    }

    fn get_by_state(&self, state: JobState, skip: usize, take: usize) -> Result<Vec<JobIndex>> {
        self.query_rows(
            "WHERE current_state = ?1 ORDER BY created_at_utc ASC LIMIT ?2 OFFSET ?3",
            params![state.as_str(), take as i64, skip as i64],
        )
    }

    fn get_non_terminal(&self, skip: usize, take: usize) -> Result<Vec<JobIndex>> {
        self.query_rows(
            &format!(
                "WHERE current_state NOT IN {} ORDER BY created_at_utc ASC, job_id ASC
                 LIMIT ?1 OFFSET ?2",
                TERMINAL_STATES_SQL
            ),
            params![take as i64, skip as i64],
        )
    }

    fn delete_by_org_ds(&self, org_slug: &str, ds_slug: &str) -> Result<usize> {
        let conn = lock_conn(&self.conn)?;
        let deleted = conn.execute(
            "DELETE FROM job_index WHERE org_slug = ?1 AND ds_slug = ?2",
            params![org_slug, ds_slug],
        )?;
        Ok(deleted)
    }

    fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = lock_conn(&self.conn)?;
        let deleted = conn.execute(
            &format!(
                "DELETE FROM job_index WHERE current_state IN {} AND last_state_change_utc < ?1",
                TERMINAL_STATES_SQL
            ),
            params![format_timestamp(&cutoff)],
        )?;
        Ok(deleted)
    }
}
