use crate::{error::ApiResult, state::AppState};
use aiw_orchestrator::{CreateWorkspaceRequest, WorkspaceRecord};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/workspaces/{id}",
            get(get_workspace).delete(delete_workspace),
        )
        .route("/workspaces/{id}/stop", post(stop_workspace))
}

/// Result of an administrative action.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceActionResponse {
    pub success: bool,
    pub workspace: WorkspaceRecord,
}

/// Create a workspace and provision it.
///
/// The request returns once the workspace is `ready` or provisioning failed.
#[utoipa::path(
    post,
    path = "/workspaces",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 201, description = "Workspace ready", body = WorkspaceRecord),
        (status = 400, description = "Invalid name"),
        (status = 409, description = "Workspace id already taken"),
        (status = 502, description = "A collaborator failed while provisioning"),
        (status = 504, description = "Provisioning timed out")
    ),
    tag = "workspaces"
)]
pub async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<(StatusCode, Json<WorkspaceRecord>)> {
    let workspace = state.orchestrator.create_workspace(req).await?;

    Ok((StatusCode::CREATED, Json(workspace)))
}

#[utoipa::path(
    get,
    path = "/workspaces",
    responses((status = 200, description = "All known workspaces", body = [WorkspaceRecord])),
    tag = "workspaces"
)]
pub async fn list_workspaces(State(state): State<AppState>) -> ApiResult<Json<Vec<WorkspaceRecord>>> {
    let mut workspaces = state.orchestrator.list_workspaces().await?;
    workspaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(workspaces))
}

#[utoipa::path(
    get,
    path = "/workspaces/{id}",
    params(("id" = String, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace record", body = WorkspaceRecord),
        (status = 404, description = "Unknown workspace")
    ),
    tag = "workspaces"
)]
pub async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceRecord>> {
    let workspace = state.orchestrator.get_workspace(&id).await?;

    Ok(Json(workspace))
}

#[utoipa::path(
    post,
    path = "/workspaces/{id}/stop",
    params(("id" = String, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace stopped", body = WorkspaceActionResponse),
        (status = 404, description = "Unknown workspace"),
        (status = 409, description = "Workspace cannot be stopped from its current state")
    ),
    tag = "workspaces"
)]
pub async fn stop_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceActionResponse>> {
    let workspace = state.orchestrator.stop_workspace(&id).await?;

    Ok(Json(WorkspaceActionResponse {
        success: true,
        workspace,
    }))
}

/// Destroy the workspace environment. The repository is kept.
#[utoipa::path(
    delete,
    path = "/workspaces/{id}",
    params(("id" = String, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace deleted", body = WorkspaceActionResponse),
        (status = 404, description = "Unknown workspace"),
        (status = 409, description = "Workspace already deleted or still provisioning")
    ),
    tag = "workspaces"
)]
pub async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceActionResponse>> {
    let workspace = state.orchestrator.delete_workspace(&id).await?;

    Ok(Json(WorkspaceActionResponse {
        success: true,
        workspace,
    }))
}
