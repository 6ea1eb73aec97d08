use super::models::JobIndex;
use super::JobIndexStore;
use crate::background_jobs::{JobEngine, JobState};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub examined: usize,
    pub updated: usize,
    pub missing: usize,
}

/// Repairs index rows whose mirrored state drifted from the engine.
pub struct JobIndexSyncService {
    engine: Arc<dyn JobEngine>,
    store: Arc<dyn JobIndexStore>,
}

impl JobIndexSyncService {
    pub fn new(engine: Arc<dyn JobEngine>, store: Arc<dyn JobIndexStore>) -> Self {
        Self { engine, store }
    }

    pub fn sync_job_index_states(&self) -> Result<SyncReport> {
        // Snapshot first: repaired rows leave the non-terminal set and would
        // shift later pages.
        let mut rows: Vec<JobIndex> = Vec::new();
        loop {
            let page = self.store.get_non_terminal(rows.len(), PAGE_SIZE)?;
            let done = page.len() < PAGE_SIZE;
            rows.extend(page);
            if done {
                break;
            }
        }

        let mut report = SyncReport::default();
        for row in rows {
            report.examined += 1;
            let engine_state = match self.engine.get_state(&row.job_id) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Failed to read engine state of job {}: {:#}", row.job_id, e);
                    continue;
                }
            };

            let target = match engine_state {
                Some(state) => state,
                None => {
                    report.missing += 1;
                    JobState::Deleted
                }
            };
            if row.state() == Some(target) {
                continue;
            }

            // The hook may have recorded a newer transition since the snapshot
            match self.store.get(&row.job_id) {
                Ok(Some(current)) if current.last_state_change_utc > row.last_state_change_utc => {
                    debug!("Job {} moved on since the snapshot, skipping", row.job_id);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to re-read index row of job {}: {:#}", row.job_id, e);
                    continue;
                }
            }

            debug!(
                "Job {} drifted: index says {}, engine says {}",
                row.job_id, row.current_state, target
            );
            match self.store.update_state(&row.job_id, target, Utc::now()) {
                Ok(()) => report.updated += 1,
                Err(e) => warn!("Failed to repair index row of job {}: {:#}", row.job_id, e),
            }
        }

        info!(
            "Job index sync: examined {}, updated {}, missing {}",
            report.examined, report.updated, report.missing
        );
        Ok(report)
    }
}
