use crate::db::SqliteRegistry;
use crate::ids::IdStrategy;
use crate::orchestrator::{OrchestratorSettings, WorkspaceOrchestrator};
use crate::registry::{MemoryRegistry, WorkspaceRegistry};
use aiw_provider::mock::MockProvider;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Helper to create an in-memory test database with migrations applied
///
/// Each connection to `sqlite::memory:` is its own database, so the pool is
/// capped at one connection.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Short timeouts and verbatim ids, so tests can predict workspace ids.
pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        chat_timeout: Duration::from_secs(5),
        provision_timeout: Duration::from_secs(5),
        id_strategy: IdStrategy::Verbatim,
    }
}

/// Orchestrator over a fresh [`MemoryRegistry`] and the given mock.
pub fn memory_orchestrator(provider: Arc<MockProvider>) -> WorkspaceOrchestrator {
    let registry: Arc<dyn WorkspaceRegistry> = Arc::new(MemoryRegistry::new());
    WorkspaceOrchestrator::new(registry, provider, test_settings())
}

/// Orchestrator over an in-memory SQLite registry and the given mock.
pub async fn sqlite_orchestrator(provider: Arc<MockProvider>) -> WorkspaceOrchestrator {
    let registry: Arc<dyn WorkspaceRegistry> = Arc::new(SqliteRegistry::new(create_test_db().await));
    WorkspaceOrchestrator::new(registry, provider, test_settings())
}
