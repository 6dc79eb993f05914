use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use wsm_api::{create_app, logging, start_janitor_task, start_monitor_task, AppState, Config};
use wsm_manager::db::{backup_database, create_pool, run_migrations};
use wsm_manager::docker::DockerOrchestrator;
use wsm_manager::metrics::TracingMetricsSink;
use wsm_manager::replenish::{run_replenisher, ReplenishQueue, DEFAULT_QUEUE_CAPACITY};
use wsm_manager::{WorkspaceManager, WorkspaceStore};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    info!("Starting wsm-api service...");

    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, cluster={}, db_path={}",
        config.bind_addr,
        config.manager.cluster,
        config.manager.db_path.display()
    );

    // Database setup
    let db_path = &config.manager.db_path;
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let base = WorkspaceManager::new(
        config.manager.clone(),
        WorkspaceStore::new(pool),
        Arc::new(DockerOrchestrator::new()),
        Arc::new(TracingMetricsSink),
    );

    // The worker runs without a queue of its own so refills never re-enqueue
    let (queue, rx) = ReplenishQueue::channel(DEFAULT_QUEUE_CAPACITY);
    tokio::spawn(run_replenisher(base.clone(), rx));
    let manager = base.with_replenisher(queue);

    if config.monitor_interval_secs > 0 {
        tokio::spawn(start_monitor_task(
            manager.clone(),
            config.monitor_interval_secs,
        ));
        info!(
            "Monitor task started (interval: {}s)",
            config.monitor_interval_secs
        );
    } else {
        info!("Scheduled monitor disabled; use POST /invoke");
    }

    tokio::spawn(start_janitor_task(
        manager.clone(),
        config.janitor_interval_secs,
    ));
    info!(
        "Janitor task started (interval: {}s)",
        config.janitor_interval_secs
    );

    let state = AppState::new(manager).with_invoke_token(config.invoke_token.clone());
    let app = create_app(state).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
