use crate::background_jobs::JobEngine;
use crate::ddb::DdbManager;
use crate::job_index::{JobIndex, JobIndexStore};
use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Page size used when collecting a dataset's index rows.
const ROWS_PAGE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetCleanupReport {
    pub cancelled: usize,
    pub removed_rows: usize,
    pub folder_deleted: bool,
}

/// Tears down job state and files of a deleted dataset.
pub struct DatasetCleanupService {
    engine: Arc<dyn JobEngine>,
    store: Arc<dyn JobIndexStore>,
    ddb_manager: Arc<dyn DdbManager>,
}

impl DatasetCleanupService {
    pub fn new(
        engine: Arc<dyn JobEngine>,
        store: Arc<dyn JobIndexStore>,
        ddb_manager: Arc<dyn DdbManager>,
    ) -> Self {
        Self {
            engine,
            store,
            ddb_manager,
        }
    }

    /// Cancel active jobs, drop index rows and delete the dataset folder.
    ///
    /// Every step runs even when an earlier one failed. An error is returned
    /// afterwards only if the index could not be read or cleared, so a retry
    /// can finish the job. Folder failures are left to the orphan sweep.
    pub fn cleanup_deleted_dataset(
        &self,
        org_slug: &str,
        ds_slug: &str,
        internal_ref: Uuid,
    ) -> Result<DatasetCleanupReport> {
        info!("Cleaning up deleted dataset {}/{}", org_slug, ds_slug);
        let mut report = DatasetCleanupReport::default();
        let mut index_errors = Vec::new();

        match self.collect_rows(org_slug, ds_slug) {
            Ok(rows) => {
                for row in rows.iter().filter(|r| r.is_active()) {
                    match self.engine.cancel(&row.job_id) {
                        Ok(true) => {
                            report.cancelled += 1;
                            debug!("Cancelled job {} ({})", row.job_id, row.current_state);
                        }
                        Ok(false) => debug!("Job {} was no longer cancellable", row.job_id),
                        Err(e) => warn!("Failed to cancel job {}: {:#}", row.job_id, e),
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Failed to list jobs of {}/{} for cancellation: {:#}",
                    org_slug, ds_slug, e
                );
                index_errors.push(format!("query: {:#}", e));
            }
        }

        match self.store.delete_by_org_ds(org_slug, ds_slug) {
            Ok(removed) => report.removed_rows = removed,
            Err(e) => {
                warn!(
                    "Failed to delete job index rows of {}/{}: {:#}",
                    org_slug, ds_slug, e
                );
                index_errors.push(format!("delete: {:#}", e));
            }
        }

        match self.ddb_manager.delete(org_slug, internal_ref) {
            Ok(()) => report.folder_deleted = true,
            Err(e) => warn!(
                "Failed to delete folder of {}/{} ({}), leaving it to the orphan sweep: {:#}",
                org_slug, ds_slug, internal_ref, e
            ),
        }

        info!(
            "Dataset {}/{} cleanup: cancelled {}, removed {} rows, folder deleted: {}",
            org_slug, ds_slug, report.cancelled, report.removed_rows, report.folder_deleted
        );

        if !index_errors.is_empty() {
            bail!(
                "Job index cleanup of {}/{} incomplete: {}",
                org_slug,
                ds_slug,
                index_errors.join("; ")
            );
        }
        Ok(report)
    }

    fn collect_rows(&self, org_slug: &str, ds_slug: &str) -> Result<Vec<JobIndex>> {
        let mut rows = Vec::new();
        loop {
            let page = self
                .store
                .get_by_org_ds(org_slug, ds_slug, rows.len(), ROWS_PAGE)?;
            let done = page.len() < ROWS_PAGE;
            rows.extend(page);
            if done {
                return Ok(rows);
            }
        }
    }
}
