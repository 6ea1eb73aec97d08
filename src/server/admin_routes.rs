//! Admin HTTP routes.
//!
//! Provides endpoints for:
//! - Inspecting the build-pending scanner
//! - Querying the job index by dataset and path
//! - Manual job index retention cleanup
//! - Deleting a dataset and scheduling its teardown
//! - Listing and triggering recurring jobs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::background_jobs::jobs::submit_dataset_cleanup;
use crate::background_jobs::{JobError, SchedulerHandle};
use crate::cleanup::{effective_retention_days, retention_cutoff};
use crate::job_index::DEFAULT_ORG_DS_TAKE;
use crate::server::state::{
    GuardedBuildPendingService, GuardedJobIndexCleanupService, GuardedJobIndexStore,
    ServerState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_take")]
    pub take: usize,
}

fn default_take() -> usize {
    DEFAULT_ORG_DS_TAKE
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
    #[serde(default)]
    pub prefix: bool,
}

#[derive(Debug, Deserialize)]
pub struct RetentionQuery {
    pub retention_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DatasetDeletedResponse {
    pub internal_ref: String,
    pub cleanup_job_id: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job_id: String,
}

fn internal_error(message: &str, e: impl std::fmt::Display) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{}: {}", message, e),
        }),
    )
        .into_response()
}

// =============================================================================
// Build pending
// =============================================================================

/// GET /build-pending/status - Statistics of the last scanner run
async fn get_build_pending_status(
    State(service): State<GuardedBuildPendingService>,
) -> impl IntoResponse {
    Json(service.get_status())
}

// =============================================================================
// Job index
// =============================================================================

/// GET /jobs/{org}/{ds} - Index rows of a dataset, newest first
async fn get_dataset_jobs(
    State(store): State<GuardedJobIndexStore>,
    Path((org_slug, ds_slug)): Path<(String, String)>,
    Query(pagination): Query<PaginationQuery>,
) -> impl IntoResponse {
    match store.get_by_org_ds(&org_slug, &ds_slug, pagination.skip, pagination.take) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!("Failed to query jobs of {}/{}: {:#}", org_slug, ds_slug, e);
            internal_error("Failed to query job index", e)
        }
    }
}

/// GET /jobs/{org}/{ds}/path?path=..&prefix=.. - Index rows for a path
async fn get_dataset_path_jobs(
    State(store): State<GuardedJobIndexStore>,
    Path((org_slug, ds_slug)): Path<(String, String)>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    match store.get_by_org_ds_path(&org_slug, &ds_slug, &query.path, query.prefix) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(
                "Failed to query jobs of {}/{} at {}: {:#}",
                org_slug, ds_slug, query.path, e
            );
            internal_error("Failed to query job index", e)
        }
    }
}

/// POST /job-index/cleanup?retention_days=.. - Run retention now
async fn post_job_index_cleanup(
    State(service): State<GuardedJobIndexCleanupService>,
    Query(query): Query<RetentionQuery>,
) -> impl IntoResponse {
    if let Some(days) = query.retention_days {
        if retention_cutoff(chrono::Utc::now(), effective_retention_days(days)).is_none() {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("retention_days out of range: {}", days),
                }),
            )
                .into_response();
        }
    }
    match service.cleanup_job_indices(query.retention_days) {
        Ok(result) => Json(result).into_response(),
        Err(e) => internal_error("Job index cleanup failed", e),
    }
}

// =============================================================================
// Datasets
// =============================================================================

/// DELETE /datasets/{org}/{ds} - Remove the record and submit its teardown
async fn delete_dataset(
    State(state): State<ServerState>,
    Path((org_slug, ds_slug)): Path<(String, String)>,
) -> impl IntoResponse {
    let internal_ref = match state.registry_store.remove_dataset(&org_slug, &ds_slug) {
        Ok(Some(internal_ref)) => internal_ref,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to remove dataset {}/{}: {:#}", org_slug, ds_slug, e);
            return internal_error("Failed to remove dataset", e);
        }
    };

    match submit_dataset_cleanup(
        state.engine.as_ref(),
        state.dataset_cleanup.clone(),
        &org_slug,
        &ds_slug,
        internal_ref,
    ) {
        Ok(cleanup_job_id) => {
            info!("Deleted dataset {}/{} ({})", org_slug, ds_slug, internal_ref);
            (
                StatusCode::ACCEPTED,
                Json(DatasetDeletedResponse {
                    internal_ref: internal_ref.to_string(),
                    cleanup_job_id,
                }),
            )
                .into_response()
        }
        // The orphan sweep picks up the folder later
        Err(e) => {
            warn!(
                "Dataset {}/{} removed but cleanup could not be submitted: {:#}",
                org_slug, ds_slug, e
            );
            internal_error("Failed to submit dataset cleanup", e)
        }
    }
}

// =============================================================================
// Recurring jobs
// =============================================================================

/// GET /recurring-jobs - Registered recurring jobs and their last submission
async fn list_recurring_jobs(State(handle): State<SchedulerHandle>) -> impl IntoResponse {
    match handle.list_jobs().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => internal_error("Failed to list recurring jobs", e),
    }
}

/// POST /recurring-jobs/{id}/trigger - Submit a recurring job now
async fn trigger_recurring_job(
    State(handle): State<SchedulerHandle>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match handle.trigger_job(&job_id).await {
        Ok(job_id) => Json(TriggerResponse { job_id }).into_response(),
        Err(JobError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(JobError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: JobError::AlreadyRunning.to_string(),
            }),
        )
            .into_response(),
        Err(e) => internal_error("Failed to trigger job", e),
    }
}

// =============================================================================
// Router Construction
// =============================================================================

/// Build the admin routes.
///
/// - GET /build-pending/status
/// - GET /jobs/{org}/{ds}
/// - GET /jobs/{org}/{ds}/path
/// - POST /job-index/cleanup
/// - DELETE /datasets/{org}/{ds}
/// - GET /recurring-jobs
/// - POST /recurring-jobs/{id}/trigger
pub fn admin_routes() -> Router<ServerState> {
    Router::new()
        .route("/build-pending/status", get(get_build_pending_status))
        .route("/jobs/{org}/{ds}", get(get_dataset_jobs))
        .route("/jobs/{org}/{ds}/path", get(get_dataset_path_jobs))
        .route("/job-index/cleanup", post(post_job_index_cleanup))
        .route("/datasets/{org}/{ds}", delete(delete_dataset))
        .route("/recurring-jobs", get(list_recurring_jobs))
        .route("/recurring-jobs/{id}/trigger", post(trigger_recurring_job))
}
