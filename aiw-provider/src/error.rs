//! Error types for provider operations.
//!
//! Messages produced here may contain raw collaborator output (stderr, API
//! bodies). They are meant for logs and operators, not for chat users.

use aiw_core::CoreError;
use thiserror::Error;

/// Errors that can occur while talking to an external collaborator.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Command timed out: '{command}' exceeded {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("GitHub API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<CoreError> for ProviderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Dependency(tool) => ProviderError::DependencyNotFound(tool),
            CoreError::Timeout { command, seconds } => ProviderError::Timeout { command, seconds },
            other => ProviderError::CommandFailed(other.to_string()),
        }
    }
}

impl ProviderError {
    /// Convert provider error to an operator-facing hint
    pub fn user_friendly(&self) -> String {
        match self {
            Self::DependencyNotFound(tool) => {
                format!("'{}' is not installed or not on PATH", tool)
            }
            Self::Api { status: 401, .. } | Self::Api { status: 403, .. } => {
                "GitHub rejected the token; check GITHUB_TOKEN scopes (repo)".to_string()
            }
            Self::Api { status: 422, .. } => {
                "GitHub refused to create the repository; the name may already exist".to_string()
            }
            Self::CommandFailed(msg) if msg.contains("Cannot connect to the Docker daemon") => {
                "Docker daemon is not running".to_string()
            }
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_dependency_maps_to_dependency_not_found() {
        let err: ProviderError = CoreError::Dependency("devpod".to_string()).into();
        assert!(matches!(err, ProviderError::DependencyNotFound(ref t) if t == "devpod"));
        assert!(err.user_friendly().contains("devpod"));
    }

    #[test]
    fn test_core_timeout_stays_a_timeout() {
        let err: ProviderError = CoreError::Timeout {
            command: "devpod up".to_string(),
            seconds: 600,
        }
        .into();
        assert!(matches!(err, ProviderError::Timeout { seconds: 600, .. }));
    }

    #[test]
    fn test_api_error_hints() {
        let err = ProviderError::Api {
            status: 422,
            body: "name already exists on this account".to_string(),
        };
        assert!(err.user_friendly().contains("already exist"));
        assert!(err.to_string().contains("422"));
    }
}
