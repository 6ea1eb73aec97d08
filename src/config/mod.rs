mod file_config;

pub use file_config::{BackgroundJobsConfig, FileConfig};

use crate::cleanup::effective_retention_days;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub datasets_path: Option<PathBuf>,
    pub metrics_port: u16,
    pub worker_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// Root of the `{org}/{internal_ref}` dataset folders.
    pub datasets_path: PathBuf,
    /// Port of the metrics and admin server, 0 disables it.
    pub metrics_port: u16,

    pub background_jobs: BackgroundJobsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let datasets_path = file
            .datasets_path
            .map(PathBuf::from)
            .or_else(|| cli.datasets_path.clone())
            .unwrap_or_else(|| db_dir.join("datasets"));

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let jobs_file = file.background_jobs.unwrap_or_default();
        let defaults = BackgroundJobsSettings::default();
        let background_jobs = BackgroundJobsSettings {
            worker_count: jobs_file
                .worker_count
                .or(cli.worker_count)
                .unwrap_or(defaults.worker_count)
                .max(1),
            job_index_retention_days: effective_retention_days(
                jobs_file
                    .job_index_retention_days
                    .unwrap_or(defaults.job_index_retention_days),
            ),
            process_pending_builds_interval_secs: jobs_file
                .process_pending_builds_interval_secs
                .unwrap_or(defaults.process_pending_builds_interval_secs),
            orphaned_folders_interval_hours: jobs_file
                .orphaned_folders_interval_hours
                .unwrap_or(defaults.orphaned_folders_interval_hours),
            job_index_cleanup_interval_hours: jobs_file
                .job_index_cleanup_interval_hours
                .unwrap_or(defaults.job_index_cleanup_interval_hours),
            job_index_sync_interval_secs: jobs_file
                .job_index_sync_interval_secs
                .unwrap_or(defaults.job_index_sync_interval_secs),
            engine_job_expiration_hours: jobs_file
                .engine_job_expiration_hours
                .unwrap_or(defaults.engine_job_expiration_hours),
        };

        Ok(Self {
            db_dir,
            datasets_path,
            metrics_port,
            background_jobs,
        })
    }

    pub fn registry_db_path(&self) -> PathBuf {
        self.db_dir.join("registry.db")
    }

    pub fn job_index_db_path(&self) -> PathBuf {
        self.db_dir.join("job_index.db")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJobsSettings {
    pub worker_count: usize,
    pub job_index_retention_days: i64,
    pub process_pending_builds_interval_secs: u64,
    pub orphaned_folders_interval_hours: u64,
    pub job_index_cleanup_interval_hours: u64,
    pub job_index_sync_interval_secs: u64,
    pub engine_job_expiration_hours: u64,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            job_index_retention_days: 60,
            process_pending_builds_interval_secs: 60,
            orphaned_folders_interval_hours: 24,
            job_index_cleanup_interval_hours: 24,
            job_index_sync_interval_secs: 300,
            engine_job_expiration_hours: 24,
        }
    }
}
