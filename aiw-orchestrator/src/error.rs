use crate::workspace::WorkspaceState;
use aiw_provider::ProviderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Workspace already exists: {0}")]
    DuplicateId(String),

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("Workspace {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: WorkspaceState,
        to: WorkspaceState,
    },

    #[error("Workspace {id} is not ready (state: {state})")]
    NotReady { id: String, state: WorkspaceState },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Raw collaborator output lives in `detail`; it is for logs only.
    #[error("Provisioning failed for workspace {id}: {detail}")]
    Provisioning { id: String, detail: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
