use aiw_api::{create_app, start_janitor_task, ws, AppState, Config};
use aiw_orchestrator::db::{backup_database, create_pool, run_migrations};
use aiw_orchestrator::{MemoryRegistry, SqliteRegistry, WorkspaceOrchestrator, WorkspaceRegistry};
use aiw_provider::get_provider;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Dropping the guard flushes the file writer, keep it until exit.
    let _guard = aiw_logging::init_subscriber();

    info!("Starting aiw-api service...");

    let config = Config::load()?;
    info!(
        "Configuration loaded: bind_addr={}, provider={:?}",
        config.bind_addr, config.provider.container
    );

    let registry: Arc<dyn WorkspaceRegistry> = match &config.db_path {
        Some(db_path) => {
            info!("Database path: {}", db_path.display());

            if db_path.exists() {
                let backup_path = backup_database(db_path)?;
                info!("Database backed up to: {}", backup_path.display());
            }

            let pool = create_pool(db_path).await?;
            info!("Running database migrations...");
            run_migrations(&pool).await?;
            info!("Migrations complete");

            Arc::new(SqliteRegistry::new(pool))
        }
        None => {
            warn!("No database configured, workspace records will not survive a restart");
            Arc::new(MemoryRegistry::new())
        }
    };

    // Provider construction checks for CLI tools with blocking calls.
    let provider_config = config.provider.clone();
    let provider = tokio::task::spawn_blocking(move || get_provider(&provider_config))
        .await?
        .map_err(|e| anyhow!(e.user_friendly()))?;
    info!("Using provider: {}", provider.name());

    let orchestrator =
        WorkspaceOrchestrator::new(registry, provider, config.orchestrator_settings());
    let state = AppState::new(orchestrator.clone());

    match config.idle_timeout() {
        Some(idle_timeout) => {
            tokio::spawn(start_janitor_task(
                orchestrator,
                config.janitor_interval_secs,
                idle_timeout,
            ));
        }
        None => info!("Idle timeout disabled, janitor not started"),
    }

    if let Some(ws_bind_addr) = &config.ws_bind_addr {
        let listener = tokio::net::TcpListener::bind(ws_bind_addr).await?;
        info!("WebSocket listening on ws://{}/ws", ws_bind_addr);

        let ws_app = ws::routes().with_state(state.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, ws_app).await {
                error!("WebSocket listener failed: {}", e);
            }
        });
    }

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("aiw-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
