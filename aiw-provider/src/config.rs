use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Which collaborator stands up workspace environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerBackend {
    Devpod,
    Docker,
    Mock,
}

impl FromStr for ContainerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devpod" => Ok(Self::Devpod),
            "docker" => Ok(Self::Docker),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown container provider '{}'", other)),
        }
    }
}

impl fmt::Display for ContainerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Devpod => write!(f, "devpod"),
            Self::Docker => write!(f, "docker"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Resource quotas handed to the container collaborator. Not enforced here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceLimits {
    pub cpus: Option<String>,
    pub memory: Option<String>,
    pub storage: Option<String>,
}

impl ResourceLimits {
    pub fn from_env() -> Self {
        Self {
            cpus: env_opt("AIW_CPU_LIMIT"),
            memory: env_opt("AIW_MEMORY_LIMIT"),
            storage: env_opt("AIW_STORAGE_LIMIT"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_none() && self.memory.is_none() && self.storage.is_none()
    }
}

#[derive(Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_container")]
    pub container: ContainerBackend,

    #[serde(default = "default_devpod_provider")]
    pub devpod_provider: String,

    /// `devpod` executable, a bare name looked up on PATH or a path.
    #[serde(default = "default_devpod_binary")]
    pub devpod_binary: String,

    #[serde(default = "default_docker_image")]
    pub docker_image: String,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default = "default_github_token")]
    pub github_token: Option<String>,

    #[serde(default = "default_github_owner")]
    pub github_owner: Option<String>,

    /// `owner/name` of the template repository new workspaces are generated from.
    #[serde(default = "default_template_repo")]
    pub template_repo: Option<String>,

    #[serde(default = "default_private_repos")]
    pub private_repos: bool,

    #[serde(default = "default_anthropic_api_key")]
    pub anthropic_api_key: Option<String>,

    /// Command run inside the environment; the chat message is appended as one argument.
    #[serde(default = "default_handler_command")]
    pub handler_command: String,

    /// Hard kill limit for individual CLI invocations. Unset means no limit.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: Option<u64>,

    #[serde(default = "ResourceLimits::from_env")]
    pub limits: ResourceLimits,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_container() -> ContainerBackend {
    env_opt("AIW_CONTAINER_PROVIDER")
        .and_then(|s| s.parse().ok())
        .unwrap_or(ContainerBackend::Devpod)
}

fn default_devpod_provider() -> String {
    env_opt("AIW_DEVPOD_PROVIDER").unwrap_or_else(|| "docker".to_string())
}

fn default_devpod_binary() -> String {
    env_opt("AIW_DEVPOD_BINARY").unwrap_or_else(|| "devpod".to_string())
}

fn default_docker_image() -> String {
    env_opt("AIW_DOCKER_IMAGE")
        .unwrap_or_else(|| "mcr.microsoft.com/devcontainers/universal:2".to_string())
}

fn default_github_api_url() -> String {
    env_opt("AIW_GITHUB_API_URL").unwrap_or_else(|| "https://api.github.com".to_string())
}

fn default_github_token() -> Option<String> {
    env_opt("GITHUB_TOKEN")
}

fn default_github_owner() -> Option<String> {
    env_opt("AIW_GITHUB_OWNER")
}

fn default_template_repo() -> Option<String> {
    env_opt("AIW_TEMPLATE_REPO")
}

fn default_private_repos() -> bool {
    env_opt("AIW_PRIVATE_REPOS")
        .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
        .unwrap_or(true)
}

fn default_anthropic_api_key() -> Option<String> {
    env_opt("ANTHROPIC_API_KEY")
}

fn default_handler_command() -> String {
    env_opt("AIW_HANDLER_COMMAND")
        .unwrap_or_else(|| "python3 .devcontainer/claude-handler.py".to_string())
}

fn default_command_timeout() -> Option<u64> {
    env_opt("AIW_COMMAND_TIMEOUT").and_then(|s| s.parse().ok())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            container: default_container(),
            devpod_provider: default_devpod_provider(),
            devpod_binary: default_devpod_binary(),
            docker_image: default_docker_image(),
            github_api_url: default_github_api_url(),
            github_token: default_github_token(),
            github_owner: default_github_owner(),
            template_repo: default_template_repo(),
            private_repos: default_private_repos(),
            anthropic_api_key: default_anthropic_api_key(),
            handler_command: default_handler_command(),
            command_timeout_secs: default_command_timeout(),
            limits: ResourceLimits::from_env(),
        }
    }
}

impl ProviderConfig {
    /// Configuration that selects the scripted in-process provider.
    pub fn mock() -> Self {
        Self {
            container: ContainerBackend::Mock,
            ..Self::default()
        }
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("container", &self.container)
            .field("devpod_provider", &self.devpod_provider)
            .field("devpod_binary", &self.devpod_binary)
            .field("docker_image", &self.docker_image)
            .field("github_api_url", &self.github_api_url)
            .field("github_token", &redact(&self.github_token))
            .field("github_owner", &self.github_owner)
            .field("template_repo", &self.template_repo)
            .field("private_repos", &self.private_repos)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("handler_command", &self.handler_command)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_backend_parse() {
        assert_eq!("devpod".parse(), Ok(ContainerBackend::Devpod));
        assert_eq!(" Docker ".parse(), Ok(ContainerBackend::Docker));
        assert_eq!("mock".parse(), Ok(ContainerBackend::Mock));
        assert!("kubernetes".parse::<ContainerBackend>().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ProviderConfig {
            github_token: Some("ghp_supersecret".to_string()),
            anthropic_api_key: Some("sk-ant-secret".to_string()),
            ..ProviderConfig::mock()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(!rendered.contains("sk-ant-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_limits_empty() {
        assert!(ResourceLimits::default().is_empty());
        let limits = ResourceLimits {
            cpus: Some("2".to_string()),
            ..Default::default()
        };
        assert!(!limits.is_empty());
    }
}
