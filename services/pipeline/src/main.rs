//! Weather observation pipeline.
//!
//! Ingests raw JSONL files from object storage into staging, validates them
//! file by file, and promotes validated rows to hourly measurements.

mod config;
mod heartbeat;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::PipelineConfig;
use heartbeat::Heartbeat;
use ingestion::{Ingester, IngestionTracker};
use quality::{ConsistencyChecker, QualityValidator};
use storage::{FinalStore, MemoryStore, ObjectStorage, PgStore, StagingStore, TrackerStore};
use transform::Transformer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
    /// Ingest, validate, then transform
    PipelineFull,
    Ingest,
    Validate,
    Transform,
    /// Staging to final consistency report
    Consistency,
}

#[derive(Parser, Debug)]
#[command(name = "pipeline")]
#[command(about = "Weather observation ingestion, validation and transform pipeline")]
struct Args {
    /// Task to run
    #[arg(short, long, value_enum, default_value = "pipeline-full")]
    task: Task,

    /// Configuration file path (environment variables are used when absent)
    #[arg(short, long, env = "PIPELINE_CONFIG")]
    config: Option<String>,

    /// Delete the tracker record of a source key and exit
    #[arg(long, value_name = "SOURCE_KEY")]
    reset: Option<String>,

    /// List files whose last ingestion did not succeed and exit
    #[arg(long)]
    list_pending: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// Record stores shared by every stage.
struct Stores {
    tracker: Arc<dyn TrackerStore>,
    staging: Arc<dyn StagingStore>,
    finals: Arc<dyn FinalStore>,
}

impl Stores {
    async fn connect(config: &PipelineConfig) -> Result<Self> {
        match &config.database_url {
            Some(url) => {
                let store = Arc::new(PgStore::connect(url).await?);
                store.migrate().await?;
                Ok(Self {
                    tracker: store.clone(),
                    staging: store.clone(),
                    finals: store,
                })
            }
            None => {
                warn!("No DATABASE_URL configured, using an in-memory store");
                let store = Arc::new(MemoryStore::new());
                Ok(Self {
                    tracker: store.clone(),
                    staging: store.clone(),
                    finals: store,
                })
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = match &args.config {
        Some(path) => PipelineConfig::from_yaml(path)?,
        None => PipelineConfig::from_env()?,
    };
    info!(
        bucket = %config.storage.bucket,
        prefix = %config.raw_prefix,
        stations = config.stations.len(),
        "Loaded configuration"
    );

    let stores = Stores::connect(&config).await?;

    if let Some(key) = &args.reset {
        let tracker = IngestionTracker::new(stores.tracker.clone());
        tracker.reset(key).await?;
        return Ok(());
    }

    if args.list_pending {
        return list_pending(&stores).await;
    }

    let heartbeat = Heartbeat::spawn(
        &format!("{:?}", args.task),
        Duration::from_secs(config.heartbeat_interval_secs),
    );
    let result = run_task(args.task, &config, &stores).await;
    heartbeat.stop().await;

    match &result {
        Ok(()) => info!(task = ?args.task, outcome = "success", "Task finished"),
        Err(e) => error!(task = ?args.task, error = %e, "Task failed"),
    }
    result
}

async fn run_task(task: Task, config: &PipelineConfig, stores: &Stores) -> Result<()> {
    match task {
        Task::PipelineFull => {
            ingest(config, stores).await?;
            validate(stores).await?;
            transform(config, stores).await
        }
        Task::Ingest => ingest(config, stores).await,
        Task::Validate => validate(stores).await,
        Task::Transform => transform(config, stores).await,
        Task::Consistency => {
            let report = ConsistencyChecker::new(
                stores.tracker.clone(),
                stores.staging.clone(),
                stores.finals.clone(),
            )
            .run()
            .await?;
            if !report.is_consistent() {
                warn!("Consistency check reported findings");
            }
            Ok(())
        }
    }
}

async fn ingest(config: &PipelineConfig, stores: &Stores) -> Result<()> {
    let storage = Arc::new(
        ObjectStorage::new(&config.storage).context("Failed to open object storage")?,
    );
    let ingester = Ingester::new(
        storage,
        IngestionTracker::new(stores.tracker.clone()),
        stores.staging.clone(),
        stores.finals.clone(),
        config.station_directory(),
    );
    let report = ingester.ingest_all(&config.ingest_options()).await?;
    for (key, message) in &report.failed {
        error!(source_key = %key, error = %message, "File failed ingestion");
    }
    Ok(())
}

async fn validate(stores: &Stores) -> Result<()> {
    QualityValidator::new(stores.tracker.clone(), stores.staging.clone())
        .validate_pending_files()
        .await?;
    Ok(())
}

async fn transform(config: &PipelineConfig, stores: &Stores) -> Result<()> {
    let summary = Transformer::new(
        stores.tracker.clone(),
        stores.staging.clone(),
        stores.finals.clone(),
    )
    .with_timezone(config.timezone()?)
    .transform_validated_rows()
    .await?;
    info!(summary = %serde_json::to_string(&summary)?, "Transform summary");
    Ok(())
}

async fn list_pending(stores: &Stores) -> Result<()> {
    let pending = IngestionTracker::new(stores.tracker.clone())
        .pending_or_failed()
        .await?;
    info!(files = pending.len(), "Pending or failed files");
    for record in &pending {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}
