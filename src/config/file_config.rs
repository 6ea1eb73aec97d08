use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub datasets_path: Option<String>,
    pub metrics_port: Option<u16>,

    pub background_jobs: Option<BackgroundJobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub worker_count: Option<usize>,
    pub job_index_retention_days: Option<i64>,
    pub process_pending_builds_interval_secs: Option<u64>,
    pub orphaned_folders_interval_hours: Option<u64>,
    pub job_index_cleanup_interval_hours: Option<u64>,
    pub job_index_sync_interval_secs: Option<u64>,
    pub engine_job_expiration_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
