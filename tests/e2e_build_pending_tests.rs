//! End-to-end tests for the pending build scanner
//!
//! Runs the scanner against real dataset folders and lets the engine execute
//! the enqueued builds.

mod common;

use common::{TestHarness, DS_SLUG, ORG_SLUG, OTHER_DS_SLUG};
use dataset_registry_jobs::background_jobs::JobState;
use dataset_registry_jobs::build_pending::{CacheState, AUTO_BUILD_USER_ID, BUILD_PENDING_CACHE_SEED};
use dataset_registry_jobs::cache::CacheManager;
use dataset_registry_jobs::ddb::Ddb;

fn cached_state(harness: &TestHarness, org_slug: &str, ds_slug: &str) -> Option<CacheState> {
    let bytes = harness
        .cache
        .get(BUILD_PENDING_CACHE_SEED, &format!("{}/{}", org_slug, ds_slug))
        .unwrap();
    CacheState::decode(&bytes).ok()
}

#[tokio::test]
async fn test_first_tick_enqueues_indexed_build() {
    let harness = TestHarness::start();
    let (_, ddb) = harness.create_dataset(ORG_SLUG, DS_SLUG);
    std::fs::write(ddb.path().join("responses.csv"), b"id,answer\n1,yes\n").unwrap();
    ddb.mark_pending("responses.csv").unwrap();

    let service = harness.build_pending_service();
    assert!(cached_state(&harness, ORG_SLUG, DS_SLUG).is_none());

    let stats = service.process_pending_builds().unwrap();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.pending_found, 1);
    assert_eq!(stats.jobs_enqueued, 1);
    assert_eq!(stats.errors, 0);

    let cached = cached_state(&harness, ORG_SLUG, DS_SLUG).unwrap();
    assert!(cached.has_pending);
    assert!(cached.stamp_checksum.unwrap().starts_with("sha256:"));

    let rows = harness.dataset_rows(ORG_SLUG, DS_SLUG);
    assert_eq!(rows.len(), 1);
    let job_id = rows[0].job_id.clone();
    assert_eq!(rows[0].user_id.as_deref(), Some(AUTO_BUILD_USER_ID));
    assert_eq!(
        rows[0].method_display.as_deref(),
        Some("Build pending acme/survey")
    );

    harness.wait_for_state(&job_id, JobState::Succeeded).await;
    let row = harness.index_row(&job_id).unwrap();
    assert_eq!(row.state(), Some(JobState::Succeeded));
    assert!(row.processing_at_utc.is_some());
    assert!(row.succeeded_at_utc.is_some());
    assert!(!ddb.is_build_pending().unwrap());
}

#[tokio::test]
async fn test_second_tick_probes_again_then_skips() {
    let harness = TestHarness::start();
    let (_, ddb) = harness.create_dataset(ORG_SLUG, DS_SLUG);
    std::fs::write(ddb.path().join("responses.csv"), b"id\n1\n").unwrap();
    ddb.mark_pending("responses.csv").unwrap();

    let service = harness.build_pending_service();
    service.process_pending_builds().unwrap();
    let job_id = harness.dataset_rows(ORG_SLUG, DS_SLUG)[0].job_id.clone();
    harness.wait_for_state(&job_id, JobState::Succeeded).await;

    // Cached entry still says pending, so the dataset is probed again
    let second = service.process_pending_builds().unwrap();
    assert_eq!(second.checked, 1);
    assert_eq!(second.skipped, 0);
    assert_eq!(second.pending_found, 0);
    assert_eq!(second.jobs_enqueued, 0);
    assert!(!cached_state(&harness, ORG_SLUG, DS_SLUG).unwrap().has_pending);

    // Unchanged checksum and nothing pending
    let third = service.process_pending_builds().unwrap();
    assert_eq!(third.checked, 0);
    assert_eq!(third.skipped, 1);
    assert_eq!(harness.dataset_rows(ORG_SLUG, DS_SLUG).len(), 1);
}

#[tokio::test]
async fn test_changed_checksum_forces_probe() {
    let harness = TestHarness::start();
    let (_, ddb) = harness.create_dataset(ORG_SLUG, DS_SLUG);

    let service = harness.build_pending_service();
    let first = service.process_pending_builds().unwrap();
    assert_eq!(first.checked, 1);
    assert_eq!(first.pending_found, 0);
    assert_eq!(service.process_pending_builds().unwrap().skipped, 1);

    std::fs::write(ddb.path().join("wave2.csv"), b"id\n2\n").unwrap();
    ddb.mark_pending("wave2.csv").unwrap();

    let stats = service.process_pending_builds().unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.jobs_enqueued, 1);
}

#[tokio::test]
async fn test_missing_folder_is_counted_and_scan_continues() {
    let harness = TestHarness::start();
    let (_, ddb) = harness.create_dataset(ORG_SLUG, DS_SLUG);
    ddb.mark_pending("responses.csv").unwrap();
    // Registered without a folder
    harness.registry.add_dataset(ORG_SLUG, OTHER_DS_SLUG).unwrap();

    let service = harness.build_pending_service();
    let stats = service.process_pending_builds().unwrap();

    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.jobs_enqueued, 1);

    let status = service.get_status();
    assert!(status.last_run.is_some());
    assert_eq!(status.total_datasets, 2);
    assert_eq!(status.errors, 1);
    assert_eq!(status.jobs_enqueued, 1);
    assert!(harness.dataset_rows(ORG_SLUG, OTHER_DS_SLUG).is_empty());
}
