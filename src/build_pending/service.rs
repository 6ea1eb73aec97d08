use super::cache_state::CacheState;
use crate::background_jobs::jobs::BuildDatasetJob;
use crate::cache::CacheManager;
use crate::ddb::{Ddb, DdbManager};
use crate::job_index::{IndexPayload, IndexedJobEnqueuer};
use crate::registry_store::DatasetCatalog;
use crate::server::metrics;
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const BUILD_PENDING_CACHE_SEED: &str = "build-pending-tracker";
/// User id recorded on builds enqueued by the scanner.
pub const AUTO_BUILD_USER_ID: &str = "auto-build-service";

const CACHE_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);
const STALENESS_WINDOW_HOURS: i64 = 6;

/// Counters of one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub total_processed: u64,
    pub checked: u64,
    pub skipped: u64,
    pub pending_found: u64,
    pub jobs_enqueued: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default)]
struct LastRun {
    at: Option<DateTime<Utc>>,
    stats: ProcessingStats,
    duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPendingStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub total_datasets: u64,
    pub checked: u64,
    pub skipped: u64,
    pub pending_found: u64,
    pub jobs_enqueued: u64,
    pub errors: u64,
    pub duration_ms: u64,
    pub is_enabled: bool,
}

pub struct BuildPendingService {
    catalog: Arc<dyn DatasetCatalog>,
    ddb_manager: Arc<dyn DdbManager>,
    enqueuer: IndexedJobEnqueuer,
    cache: Arc<dyn CacheManager>,
    last_run: RwLock<LastRun>,
}

fn cache_key(org_slug: &str, ds_slug: &str) -> String {
    format!("{}/{}", org_slug, ds_slug)
}

impl BuildPendingService {
    pub fn new(
        catalog: Arc<dyn DatasetCatalog>,
        ddb_manager: Arc<dyn DdbManager>,
        enqueuer: IndexedJobEnqueuer,
        cache: Arc<dyn CacheManager>,
    ) -> Result<Self> {
        if !cache.is_registered(BUILD_PENDING_CACHE_SEED) {
            // Misses produce empty bytes, which read back as "never checked"
            cache.register(
                BUILD_PENDING_CACHE_SEED,
                Arc::new(|_: &str| Ok(Vec::new())),
                CACHE_EXPIRATION,
            )?;
        }
        Ok(Self {
            catalog,
            ddb_manager,
            enqueuer,
            cache,
            last_run: RwLock::new(LastRun::default()),
        })
    }

    /// Whether the dataset must be probed this tick. Any doubt resolves to
    /// probing.
    pub fn should_check_dataset(&self, org_slug: &str, ds_slug: &str, ddb: &dyn Ddb) -> bool {
        let key = cache_key(org_slug, ds_slug);
        let cached = match self.cache.get(BUILD_PENDING_CACHE_SEED, &key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Error reading pending cache for {}, forcing check: {:#}",
                    key, e
                );
                return true;
            }
        };
        let state = match CacheState::decode(&cached) {
            Ok(state) => state,
            Err(e) => {
                debug!("No usable pending cache entry for {}: {}", key, e);
                return true;
            }
        };

        let current_checksum = match ddb.get_stamp() {
            Ok(stamp) => stamp.checksum,
            Err(e) => {
                warn!("Failed to get stamp for {}, forcing check: {:#}", key, e);
                return true;
            }
        };

        if let Some(cached_checksum) = state.stamp_checksum.as_deref() {
            if cached_checksum == current_checksum && !state.has_pending {
                debug!("Skipping {}: checksum unchanged ({})", key, current_checksum);
                return false;
            }
            if cached_checksum != current_checksum {
                debug!(
                    "Checksum changed for {}: {} -> {}",
                    key, cached_checksum, current_checksum
                );
                return true;
            }
        }

        if state.has_pending {
            return true;
        }

        let age = Utc::now() - state.last_check;
        if age > ChronoDuration::hours(STALENESS_WINDOW_HOURS) || age < ChronoDuration::zero() {
            debug!("Staleness check triggered for {}: age={}", key, age);
            return true;
        }
        false
    }

    fn update_pending_status(
        &self,
        org_slug: &str,
        ds_slug: &str,
        has_pending: bool,
        stamp_checksum: Option<String>,
    ) {
        let key = cache_key(org_slug, ds_slug);
        let state = CacheState::new(has_pending, Utc::now(), stamp_checksum);
        let result = state
            .encode()
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.cache.set(BUILD_PENDING_CACHE_SEED, &key, bytes));
        if let Err(e) = result {
            warn!("Error updating pending cache for {}, continuing: {:#}", key, e);
        }
    }

    /// One reconciliation tick over every registered dataset.
    pub fn process_pending_builds(&self) -> Result<ProcessingStats> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        info!("Starting pending build scan");

        let datasets = match self.catalog.list_datasets() {
            Ok(datasets) => datasets,
            Err(e) => {
                error!("Fatal error in pending build scan: {:#}", e);
                self.record_failed_run(started_at, start_time.elapsed());
                return Err(e);
            }
        };
        debug!("Found {} datasets to process", datasets.len());

        let mut stats = ProcessingStats::default();
        for ds in &datasets {
            stats.total_processed += 1;
            let (org, slug) = (ds.org_slug.as_str(), ds.ds_slug.as_str());

            let ddb = match self.ddb_manager.get(org, ds.internal_ref) {
                Ok(ddb) => ddb,
                Err(e) => {
                    warn!("Failed to open dataset {}/{}, skipping: {:#}", org, slug, e);
                    stats.errors += 1;
                    continue;
                }
            };

            if !self.should_check_dataset(org, slug, ddb.as_ref()) {
                stats.skipped += 1;
                continue;
            }
            stats.checked += 1;

            let stamp_checksum = match ddb.get_stamp() {
                Ok(stamp) => Some(stamp.checksum),
                Err(e) => {
                    warn!("Failed to get stamp checksum for {}/{}: {:#}", org, slug, e);
                    None
                }
            };

            let has_pending = match ddb.is_build_pending() {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(
                        "Failed to check pending status for {}/{}, assuming pending: {:#}",
                        org, slug, e
                    );
                    true
                }
            };

            self.update_pending_status(org, slug, has_pending, stamp_checksum);
            if !has_pending {
                continue;
            }
            stats.pending_found += 1;

            let payload = IndexPayload::new(org, slug).with_user_id(AUTO_BUILD_USER_ID);
            let job = Arc::new(BuildDatasetJob::new(org, slug, ddb));
            match self.enqueuer.enqueue(job, payload) {
                Ok(job_id) => {
                    stats.jobs_enqueued += 1;
                    info!("Enqueued build job for {}/{}: job {}", org, slug, job_id);
                }
                Err(e) => {
                    error!("Failed to enqueue build job for {}/{}: {:#}", org, slug, e);
                    stats.errors += 1;
                }
            }
        }

        let elapsed = start_time.elapsed();
        let summary = format!(
            "Pending build scan completed: total={}, checked={}, skipped={}, pending={}, enqueued={}, errors={}",
            stats.total_processed,
            stats.checked,
            stats.skipped,
            stats.pending_found,
            stats.jobs_enqueued,
            stats.errors
        );
        if stats.pending_found > 0 || stats.errors > 0 {
            info!("{}", summary);
        } else {
            debug!("{}", summary);
        }

        self.record_run(started_at, elapsed, &stats);
        Ok(stats)
    }

    fn record_run(&self, at: DateTime<Utc>, elapsed: Duration, stats: &ProcessingStats) {
        metrics::record_build_pending_counter("total_datasets", stats.total_processed);
        metrics::record_build_pending_counter("checked", stats.checked);
        metrics::record_build_pending_counter("skipped", stats.skipped);
        metrics::record_build_pending_counter("pending_found", stats.pending_found);
        metrics::record_build_pending_counter("jobs_enqueued", stats.jobs_enqueued);
        metrics::record_build_pending_counter("errors", stats.errors);

        match self.last_run.write() {
            Ok(mut last) => {
                *last = LastRun {
                    at: Some(at),
                    stats: stats.clone(),
                    duration_ms: elapsed.as_millis() as u64,
                }
            }
            Err(_) => error!("Build pending statistics lock poisoned"),
        }
    }

    /// Failed runs keep the previous counters.
    fn record_failed_run(&self, at: DateTime<Utc>, elapsed: Duration) {
        match self.last_run.write() {
            Ok(mut last) => {
                last.at = Some(at);
                last.duration_ms = elapsed.as_millis() as u64;
            }
            Err(_) => error!("Build pending statistics lock poisoned"),
        }
    }

    pub fn get_status(&self) -> BuildPendingStatus {
        let last = self
            .last_run
            .read()
            .map(|last| last.clone())
            .unwrap_or_default();
        BuildPendingStatus {
            last_run: last.at,
            total_datasets: last.stats.total_processed,
            checked: last.stats.checked,
            skipped: last.stats.skipped,
            pending_found: last.stats.pending_found,
            jobs_enqueued: last.stats.jobs_enqueued,
            errors: last.stats.errors,
            duration_ms: last.duration_ms,
            is_enabled: true,
        }
    }
}
