//! Chat exchanges and parsing of the in-environment handler's output.
//!
//! The handler prints progress lines and finally a JSON object
//! `{"success": bool, "response": "...", "error": "..."}`, possibly
//! pretty-printed over several lines.

use aiw_provider::CommandOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What chat users see when anything goes wrong. Details are only logged.
pub const GENERIC_CHAT_ERROR: &str =
    "I encountered an error processing your request. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatExchange {
    pub workspace_id: String,
    pub request_text: String,
    pub response_text: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatExchange {
    pub fn succeeded(workspace_id: &str, request: &str, response: String) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            request_text: request.to_string(),
            response_text: response,
            success: true,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(workspace_id: &str, request: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            request_text: request.to_string(),
            response_text: GENERIC_CHAT_ERROR.to_string(),
            success: false,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HandlerReply {
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Extract the reply text from handler output.
///
/// `Err` carries a diagnostic for the logs.
pub fn parse_handler_output(output: &CommandOutput) -> Result<String, String> {
    if !output.success() {
        return Err(format!(
            "handler exited with status {:?}: {}",
            output.status,
            output.tail(20)
        ));
    }

    let reply = find_reply(&output.stdout).ok_or_else(|| {
        format!(
            "handler output contained no reply object: {}",
            output.tail(20)
        )
    })?;

    if !reply.success {
        return Err(format!(
            "handler reported failure: {}",
            reply
                .error
                .or(reply.response)
                .unwrap_or_else(|| "no detail".to_string())
        ));
    }

    Ok(reply.response.unwrap_or_default())
}

/// The reply is the first line-start `{` from which the rest of stdout parses.
fn find_reply(stdout: &str) -> Option<HandlerReply> {
    if let Ok(reply) = serde_json::from_str::<HandlerReply>(stdout.trim()) {
        return Some(reply);
    }

    let mut offset = 0;
    for line in stdout.split_inclusive('\n') {
        if line.trim_start().starts_with('{') {
            let candidate = stdout[offset..].trim();
            if let Ok(reply) = serde_json::from_str::<HandlerReply>(candidate) {
                return Some(reply);
            }
        }
        offset += line.len();
    }

    None
}
