use crate::routes::{
    chat::{ChatRequest, ChatResponse},
    health::{HealthResponse, ReadinessResponse},
    workspaces::WorkspaceActionResponse,
};
use aiw_orchestrator::{ChatExchange, CreateWorkspaceRequest, WorkspaceRecord, WorkspaceState};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::workspaces::list_workspaces,
        crate::routes::workspaces::create_workspace,
        crate::routes::workspaces::get_workspace,
        crate::routes::workspaces::stop_workspace,
        crate::routes::workspaces::delete_workspace,
        crate::routes::chat::send_chat,
    ),
    components(
        schemas(
            WorkspaceRecord,
            WorkspaceState,
            CreateWorkspaceRequest,
            WorkspaceActionResponse,
            ChatExchange,
            ChatRequest,
            ChatResponse,
            HealthResponse,
            ReadinessResponse
        )
    ),
    tags(
        (name = "workspaces", description = "Workspace lifecycle"),
        (name = "chat", description = "Message dispatch to a workspace's assistant"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
