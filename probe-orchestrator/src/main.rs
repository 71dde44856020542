use std::sync::Arc;

use anyhow::Context;
use probe_runner::Scheduler;
use probe_runner::scheduler::{fail_interrupted_jobs, spawn_sweeper};
use probe_runner::service::StandardJobExecutor;
use probe_runner::store::{
    DefinitionSeed, DefinitionStore, InMemoryDefinitionStore, InMemoryReportStore,
    InMemoryStateStore, ReportStore, StateStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{OrchestratorConfig, StoreBackend};
use crate::store::{PgDefinitionStore, PgReportStore, PgStateStore};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod store;

struct Stores {
    definitions: Arc<dyn DefinitionStore>,
    states: Arc<dyn StateStore>,
    reports: Arc<dyn ReportStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "probe_orchestrator=info,probe_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Probe Orchestrator...");

    let config = OrchestratorConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let stores = open_stores(&config).await?;

    // The queue does not survive a restart; fail what the last run left behind
    fail_interrupted_jobs(
        stores.definitions.as_ref(),
        stores.states.as_ref(),
        stores.reports.clone(),
    )
    .await
    .context("Failed to recover interrupted jobs")?;

    let executor = StandardJobExecutor::new(&config.runner)
        .context("Failed to initialize job executor")?;
    let scheduler = Arc::new(Scheduler::start(
        &config.runner,
        stores.definitions,
        stores.states.clone(),
        stores.reports.clone(),
        Arc::new(executor),
    ));
    let sweeper = spawn_sweeper(stores.states, config.runner.sweep_interval);

    // Build router with all API endpoints
    let app = api::create_router(
        api::AppState {
            scheduler: scheduler.clone(),
            reports: stores.reports,
        },
        &config.runner.artifact_dir,
    );

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    scheduler.shutdown().await;

    tracing::info!("Probe Orchestrator stopped");
    Ok(())
}

async fn open_stores(config: &OrchestratorConfig) -> anyhow::Result<Stores> {
    match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok(Stores {
                definitions: Arc::new(PgDefinitionStore::new(pool.clone())),
                states: Arc::new(PgStateStore::new(pool.clone(), config.runner.retention())),
                reports: Arc::new(PgReportStore::new(pool)),
            })
        }
        StoreBackend::Memory => {
            let seed = match &config.definitions_file {
                Some(path) => DefinitionSeed::from_json_file(path)
                    .await
                    .with_context(|| format!("Failed to load definitions from {}", path.display()))?,
                None => {
                    tracing::warn!("No DEFINITIONS_FILE set, every submission will be rejected");
                    DefinitionSeed::default()
                }
            };

            tracing::info!("Using in-memory stores");

            Ok(Stores {
                definitions: Arc::new(InMemoryDefinitionStore::from_seed(seed)),
                states: Arc::new(InMemoryStateStore::new(config.runner.retention())),
                reports: Arc::new(InMemoryReportStore::new()),
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining jobs");
}
