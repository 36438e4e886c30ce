use crate::error::{OrchestratorError, Result};
use crate::registry::{Mutator, WorkspaceRegistry};
use crate::workspace::{apply_transition, WorkspaceRecord, WorkspaceState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, instrument, warn};

/// Initialize database connection pool
#[instrument(fields(db_path = %db_path.display()))]
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    Ok(pool)
}

/// Run database migrations
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Backup database before migrations (returns backup path)
pub fn backup_database(db_path: &Path) -> Result<std::path::PathBuf> {
    let timestamp = Utc::now().timestamp();
    let backup_path = db_path.with_extension(format!("db.backup.{}", timestamp));

    if db_path.exists() {
        std::fs::copy(db_path, &backup_path)?;
    }

    Ok(backup_path)
}

const TRANSITION_ATTEMPTS: usize = 5;

/// Registry persisted in SQLite.
///
/// Transitions are compare-and-swap on the state and `last_error` columns:
/// two writers racing on the same record cannot both succeed, and an error
/// recorded concurrently is never overwritten with a stale value.
#[derive(Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl WorkspaceRegistry for SqliteRegistry {
    async fn create(
        &self,
        id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<WorkspaceRecord> {
        let record = WorkspaceRecord::new(id, name, description, Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO workspaces (id, name, description, state, created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.state)
        .bind(record.created_at.timestamp_millis())
        .bind(record.last_activity_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(OrchestratorError::DuplicateId(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<WorkspaceRecord> {
        let row = sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;

        Ok(row.into())
    }

    async fn transition(
        &self,
        id: &str,
        expected: &[WorkspaceState],
        next: WorkspaceState,
        mutator: Mutator,
    ) -> Result<WorkspaceRecord> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let current = self.get(id).await?;
            let mut updated = current.clone();
            apply_transition(&mut updated, expected, next, |r| mutator(r))?;

            // `IS` so that a NULL last_error compares equal to itself.
            let result = sqlx::query(
                "UPDATE workspaces
                 SET state = ?, name = ?, description = ?, repository_url = ?, clone_url = ?,
                     container_handle = ?, last_activity_at = MAX(last_activity_at, ?), last_error = ?
                 WHERE id = ? AND state = ? AND last_error IS ?",
            )
            .bind(updated.state)
            .bind(&updated.name)
            .bind(&updated.description)
            .bind(&updated.repository_url)
            .bind(&updated.clone_url)
            .bind(&updated.container_handle)
            .bind(updated.last_activity_at.timestamp_millis())
            .bind(&updated.last_error)
            .bind(id)
            .bind(current.state)
            .bind(&current.last_error)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return self.get(id).await;
            }

            // Someone else wrote the record between our read and write.
            let observed = self.get(id).await?;
            if observed.state != current.state {
                warn!(
                    workspace_id = id,
                    expected = %current.state,
                    observed = %observed.state,
                    "Lost transition race"
                );
                return Err(OrchestratorError::InvalidTransition {
                    id: id.to_string(),
                    from: observed.state,
                    to: next,
                });
            }
            debug!(workspace_id = id, "last_error changed concurrently, retrying transition");
        }

        Err(OrchestratorError::Internal(format!(
            "transition of workspace {} to {} kept conflicting with concurrent writes",
            id, next
        )))
    }

    async fn touch(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE workspaces SET last_activity_at = MAX(last_activity_at, ?) WHERE id = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn record_error(&self, id: &str, message: Option<String>) -> Result<()> {
        let result = sqlx::query("UPDATE workspaces SET last_error = ? WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkspaceRecord>> {
        let rows =
            sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Internal row type for sqlx
#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: String,
    name: String,
    description: Option<String>,
    state: WorkspaceState,
    repository_url: Option<String>,
    clone_url: Option<String>,
    container_handle: Option<String>,
    created_at: i64,
    last_activity_at: i64,
    last_error: Option<String>,
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl From<WorkspaceRow> for WorkspaceRecord {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            state: row.state,
            repository_url: row.repository_url,
            clone_url: row.clone_url,
            container_handle: row.container_handle,
            created_at: from_millis(row.created_at),
            last_activity_at: from_millis(row.last_activity_at),
            last_error: row.last_error,
        }
    }
}
