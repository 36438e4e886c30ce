use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Lifecycle state of a workspace.
///
/// Provisioning only moves forward:
/// `pending -> provisioning_repo -> provisioning_container -> ready`, with
/// `failed` reachable from any provisioning state. `deleted` is final.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkspaceState {
    Pending,
    ProvisioningRepo,
    ProvisioningContainer,
    Ready,
    Failed,
    Stopped,
    Deleted,
}

impl WorkspaceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ProvisioningRepo => "provisioning_repo",
            Self::ProvisioningContainer => "provisioning_container",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }

    pub fn is_provisioning(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::ProvisioningRepo | Self::ProvisioningContainer
        )
    }

    /// Whether `self -> next` is a legal edge of the lifecycle graph.
    pub fn can_transition_to(self, next: WorkspaceState) -> bool {
        use WorkspaceState::*;

        match (self, next) {
            (Pending, ProvisioningRepo)
            | (ProvisioningRepo, ProvisioningContainer)
            | (ProvisioningContainer, Ready) => true,
            (from, Failed) => from.is_provisioning(),
            (Ready | Failed, Stopped) => true,
            (Ready | Failed | Stopped, Deleted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: WorkspaceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WorkspaceRecord {
    /// A fresh `pending` record.
    ///
    /// Timestamps are truncated to milliseconds, the precision records are
    /// persisted with, so a stored copy never reads back earlier than this one.
    pub fn new(id: &str, name: &str, description: Option<String>, now: DateTime<Utc>) -> Self {
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description,
            state: WorkspaceState::Pending,
            repository_url: None,
            clone_url: None,
            container_handle: None,
            created_at: now,
            last_activity_at: now,
            last_error: None,
        }
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.state == WorkspaceState::Ready && self.last_activity_at < cutoff
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Applies a transition to `record` in place.
///
/// Shared by every registry so the rules cannot drift between backends. On
/// error `record` may be partially modified; callers work on a copy.
pub(crate) fn apply_transition(
    record: &mut WorkspaceRecord,
    expected: &[WorkspaceState],
    next: WorkspaceState,
    mutator: impl FnOnce(&mut WorkspaceRecord),
) -> Result<()> {
    let from = record.state;
    if !expected.contains(&from) || !from.can_transition_to(next) {
        return Err(OrchestratorError::InvalidTransition {
            id: record.id.clone(),
            from,
            to: next,
        });
    }

    let id = record.id.clone();
    let created_at = record.created_at;
    let last_activity_at = record.last_activity_at;

    if next != WorkspaceState::Failed {
        record.last_error = None;
    }
    mutator(record);

    record.id = id;
    record.created_at = created_at;
    record.last_activity_at = record.last_activity_at.max(last_activity_at);
    record.state = next;

    if record.container_handle.is_some() && record.repository_url.is_none() {
        return Err(OrchestratorError::InvalidState(format!(
            "workspace {} would have a container handle without a repository",
            record.id
        )));
    }

    Ok(())
}
