use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all registry job metrics
const PREFIX: &str = "registry";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Engine
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job attempts by outcome"),
        &["job", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job attempt duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["job"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOBS_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_jobs_running"), "Background job attempts currently executing"),
        &["job"]
    ).expect("Failed to create background_jobs_running metric");

    pub static ref JOB_STATE_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_state_transitions_total"), "Job state transitions applied by the engine"),
        &["state"]
    ).expect("Failed to create job_state_transitions_total metric");

    // Reconciliation
    pub static ref BUILD_PENDING_LAST_RUN: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_build_pending_last_run"), "Counters of the last build-pending scan"),
        &["counter"]
    ).expect("Failed to create build_pending_last_run metric");

    pub static ref JOB_INDEX_ROWS_DELETED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_index_rows_deleted_total"), "Job index rows deleted"),
        &["reason"]
    ).expect("Failed to create job_index_rows_deleted_total metric");

    pub static ref ORPHANED_FOLDERS_DELETED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_orphaned_folders_deleted_total"),
        "Dataset folders deleted because no dataset references them"
    ).expect("Failed to create orphaned_folders_deleted_total metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (tests)
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOBS_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(JOB_STATE_TRANSITIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BUILD_PENDING_LAST_RUN.clone()));
    let _ = REGISTRY.register(Box::new(JOB_INDEX_ROWS_DELETED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ORPHANED_FOLDERS_DELETED_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_background_job_execution(job: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job: &str, running: bool) {
    let gauge = BACKGROUND_JOBS_RUNNING.with_label_values(&[job]);
    if running {
        gauge.inc();
    } else {
        gauge.dec();
    }
}

pub fn record_job_state_transition(state: &str) {
    JOB_STATE_TRANSITIONS_TOTAL.with_label_values(&[state]).inc();
}

pub fn record_build_pending_counter(counter: &str, value: u64) {
    BUILD_PENDING_LAST_RUN
        .with_label_values(&[counter])
        .set(value as f64);
}

pub fn record_job_index_rows_deleted(reason: &str, count: usize) {
    JOB_INDEX_ROWS_DELETED_TOTAL
        .with_label_values(&[reason])
        .inc_by(count as f64);
}

pub fn record_orphaned_folders_deleted(count: usize) {
    ORPHANED_FOLDERS_DELETED_TOTAL.inc_by(count as u64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
