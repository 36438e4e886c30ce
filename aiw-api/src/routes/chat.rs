use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub fn routes() -> Router<AppState> {
    Router::new().route("/workspaces/{id}/chat", post(send_chat))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Send a chat message to the workspace's handler.
///
/// Handler failures still answer 200, with `success: false` and a generic
/// response text.
#[utoipa::path(
    post,
    path = "/workspaces/{id}/chat",
    params(("id" = String, Path, description = "Workspace id")),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Handler reply", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 404, description = "Unknown workspace"),
        (status = 409, description = "Workspace is not ready")
    ),
    tag = "chat"
)]
pub async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let exchange = state.orchestrator.dispatch_chat(&id, &req.message).await?;

    Ok(Json(ChatResponse {
        success: exchange.success,
        response: exchange.response_text,
        timestamp: exchange.timestamp,
    }))
}
