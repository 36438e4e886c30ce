use aiw_orchestrator::OrchestratorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// Collaborator output is logged where this is built, never returned.
    ProvisioningFailed { workspace_id: String },
    GatewayTimeout(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ProvisioningFailed { .. } => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show to clients.
    pub fn message(&self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::GatewayTimeout(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::ProvisioningFailed { .. } => "Workspace provisioning failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::ProvisioningFailed { workspace_id } => json!({
                "error": self.message(),
                "workspaceId": workspace_id,
            }),
            _ => json!({ "error": self.message() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NotFound(id) => {
                ApiError::NotFound(format!("Workspace not found: {}", id))
            }
            OrchestratorError::InvalidInput(msg) => ApiError::BadRequest(msg),
            OrchestratorError::DuplicateId(_)
            | OrchestratorError::InvalidTransition { .. }
            | OrchestratorError::NotReady { .. } => ApiError::Conflict(err.to_string()),
            OrchestratorError::Provisioning { id, detail } => {
                error!(workspace_id = %id, "Provisioning failed: {}", detail);
                ApiError::ProvisioningFailed { workspace_id: id }
            }
            OrchestratorError::Timeout { .. } => ApiError::GatewayTimeout(err.to_string()),
            OrchestratorError::Provider(e) => {
                error!("Provider error: {}", e);
                ApiError::Internal(e.user_friendly())
            }
            _ => {
                error!("Internal error: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiw_orchestrator::WorkspaceState;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (OrchestratorError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (OrchestratorError::DuplicateId("x".into()), StatusCode::CONFLICT),
            (
                OrchestratorError::NotReady {
                    id: "x".into(),
                    state: WorkspaceState::Stopped,
                },
                StatusCode::CONFLICT,
            ),
            (
                OrchestratorError::InvalidTransition {
                    id: "x".into(),
                    from: WorkspaceState::Deleted,
                    to: WorkspaceState::Stopped,
                },
                StatusCode::CONFLICT,
            ),
            (OrchestratorError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                OrchestratorError::Timeout {
                    operation: "container provisioning".into(),
                    seconds: 900,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (OrchestratorError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_provisioning_detail_is_not_exposed() {
        let err = ApiError::from(OrchestratorError::Provisioning {
            id: "demo".into(),
            detail: "fatal: could not read Username for 'https://github.com'".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.message(), "Workspace provisioning failed");
        assert!(matches!(err, ApiError::ProvisioningFailed { ref workspace_id } if workspace_id == "demo"));
    }
}
