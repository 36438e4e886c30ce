//! Workspace orchestration business logic
//!
//! Records, their lifecycle, and the orchestrator that drives provisioning,
//! chat dispatch and teardown through a [`aiw_provider::Provider`]. It is
//! consumed by the aiw-api HTTP service but has no HTTP knowledge itself.

pub mod chat;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod orchestrator;
pub mod registry;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chat::{ChatExchange, GENERIC_CHAT_ERROR};
pub use db::SqliteRegistry;
pub use error::{OrchestratorError, Result};
pub use events::{ChatOrigin, EventBus, WorkspaceEvent};
pub use ids::IdStrategy;
pub use orchestrator::{OrchestratorSettings, WorkspaceOrchestrator};
pub use registry::{MemoryRegistry, Mutator, WorkspaceRegistry};
pub use workspace::{CreateWorkspaceRequest, WorkspaceRecord, WorkspaceState};
