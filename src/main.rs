use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dataset_registry_jobs::background_jobs::jobs::{
    EngineExpiryJob, JobIndexCleanupJob, JobIndexSyncJob, OrphanedFoldersJob,
    ProcessPendingBuildsJob,
};
use dataset_registry_jobs::background_jobs::{
    create_scheduler, HookEvent, JobEngine, JobSchedule, LocalJobEngine, RecurringJob,
};
use dataset_registry_jobs::build_pending::BuildPendingService;
use dataset_registry_jobs::cache::InMemoryCacheManager;
use dataset_registry_jobs::cleanup::{
    DatasetCleanupService, JobIndexCleanupService, OrphanedFolderCleanupService,
};
use dataset_registry_jobs::config::{AppConfig, CliConfig, FileConfig};
use dataset_registry_jobs::ddb::FsDdbManager;
use dataset_registry_jobs::job_index::{
    IndexedJobEnqueuer, JobIndexStateHook, JobIndexStore, JobIndexSyncService,
    SqliteJobIndexStore,
};
use dataset_registry_jobs::registry_store::SqliteRegistryStore;
use dataset_registry_jobs::server::{self, run_server, ServerState};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding registry.db and job_index.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Root of the dataset folders. Defaults to {db_dir}/datasets.
    #[clap(long, value_parser = parse_path)]
    pub datasets_path: Option<PathBuf>,

    /// The port for the metrics and admin server. 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Number of job engine workers.
    #[clap(long)]
    pub worker_count: Option<usize>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            db_dir: args.db_dir.clone(),
            datasets_path: args.datasets_path.clone(),
            metrics_port: args.metrics_port,
            worker_count: args.worker_count,
        }
    }
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h * 60 * 60)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!("Starting registry-jobs ({})", env!("GIT_HASH"));

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;
    let jobs_config = &config.background_jobs;

    std::fs::create_dir_all(&config.datasets_path).with_context(|| {
        format!("Failed to create datasets folder {:?}", config.datasets_path)
    })?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    info!("Opening registry database at {:?}...", config.registry_db_path());
    let registry_store = Arc::new(SqliteRegistryStore::new(config.registry_db_path())?);
    info!("Opening job index database at {:?}...", config.job_index_db_path());
    let job_index_store: Arc<dyn JobIndexStore> =
        Arc::new(SqliteJobIndexStore::new(config.job_index_db_path())?);

    let shutdown_token = CancellationToken::new();
    let local_engine = LocalJobEngine::new(shutdown_token.child_token());
    local_engine.add_observer(Arc::new(JobIndexStateHook::new(job_index_store.clone())));
    let worker_handles = local_engine.start(jobs_config.worker_count);
    let engine: Arc<dyn JobEngine> = Arc::new(local_engine.clone());

    let ddb_manager = Arc::new(FsDdbManager::new(config.datasets_path.clone()));
    let enqueuer = IndexedJobEnqueuer::new(engine.clone(), job_index_store.clone());

    let build_pending = Arc::new(BuildPendingService::new(
        registry_store.clone(),
        ddb_manager.clone(),
        enqueuer,
        Arc::new(InMemoryCacheManager::new()),
    )?);
    let dataset_cleanup = Arc::new(DatasetCleanupService::new(
        engine.clone(),
        job_index_store.clone(),
        ddb_manager,
    ));
    let orphaned_folders = Arc::new(OrphanedFolderCleanupService::new(
        registry_store.clone(),
        config.datasets_path.clone(),
    ));
    let job_index_cleanup = Arc::new(JobIndexCleanupService::new(
        job_index_store.clone(),
        jobs_config.job_index_retention_days,
    ));
    let job_index_sync = Arc::new(JobIndexSyncService::new(
        engine.clone(),
        job_index_store.clone(),
    ));

    let (mut scheduler, scheduler_handle) =
        create_scheduler(engine.clone(), shutdown_token.child_token());

    scheduler
        .register_job(RecurringJob {
            id: "process_pending_builds",
            name: "Process Pending Builds",
            description: "Enqueue builds for datasets with pending files",
            schedule: JobSchedule::Interval(Duration::from_secs(
                jobs_config.process_pending_builds_interval_secs,
            )),
            job: Arc::new(ProcessPendingBuildsJob::new(build_pending.clone())),
        })
        .await;
    scheduler
        .register_job(RecurringJob {
            id: "orphaned_folders_cleanup",
            name: "Orphaned Folders Cleanup",
            description: "Delete dataset folders with no registry record",
            schedule: JobSchedule::Combined {
                interval: Some(hours(jobs_config.orphaned_folders_interval_hours)),
                hooks: vec![HookEvent::OnStartup],
            },
            job: Arc::new(OrphanedFoldersJob::new(orphaned_folders)),
        })
        .await;
    scheduler
        .register_job(RecurringJob {
            id: "job_index_cleanup",
            name: "Job Index Cleanup",
            description: "Delete finished job index rows past retention",
            schedule: JobSchedule::Interval(hours(jobs_config.job_index_cleanup_interval_hours)),
            job: Arc::new(JobIndexCleanupJob::new(job_index_cleanup.clone())),
        })
        .await;
    scheduler
        .register_job(RecurringJob {
            id: "job_index_sync",
            name: "Job Index Sync",
            description: "Repair job index rows that drifted from the engine",
            schedule: JobSchedule::Interval(Duration::from_secs(
                jobs_config.job_index_sync_interval_secs,
            )),
            job: Arc::new(JobIndexSyncJob::new(job_index_sync)),
        })
        .await;
    scheduler
        .register_job(RecurringJob {
            id: "engine_job_expiry",
            name: "Engine Job Expiry",
            description: "Forget finished engine jobs past expiration",
            schedule: JobSchedule::Interval(hours(1)),
            job: Arc::new(EngineExpiryJob::new(
                local_engine.clone(),
                jobs_config.engine_job_expiration_hours,
            )),
        })
        .await;

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    if config.metrics_port != 0 {
        let state = ServerState {
            start_time: Instant::now(),
            hash: env!("GIT_HASH").to_string(),
            engine: engine.clone(),
            job_index_store: job_index_store.clone(),
            registry_store,
            build_pending,
            dataset_cleanup,
            job_index_cleanup,
            scheduler_handle,
        };
        let port = config.metrics_port;
        info!("Metrics and admin routes available at port {}!", port);
        tokio::spawn(async move {
            if let Err(e) = run_server(state, port).await {
                error!("Admin server stopped: {:#}", e);
            }
        });
    } else {
        info!("Admin server disabled");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down...");

    shutdown_token.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Job worker failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}
