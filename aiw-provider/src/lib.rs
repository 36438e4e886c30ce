//! Workspace provider abstraction library.
//!
//! Every side effect the control plane has on the outside world goes through
//! the [`Provider`] trait: creating the source repository, standing up the
//! environment, running the chat handler inside it, and stopping or deleting
//! it. Implementations shell out to `devpod`/`docker` or call the GitHub REST
//! API, and are synchronous; async callers run them on the blocking pool.

use std::sync::Arc;

pub use aiw_core::CommandOutput;

pub mod config;
pub mod devpod;
pub mod docker;
pub mod error;
pub mod github;
pub mod mock;

pub use config::{ContainerBackend, ProviderConfig, ResourceLimits};
pub use error::{ProviderError, Result};

/// What the repository collaborator needs to create a workspace repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub name: String,
    pub description: Option<String>,
}

/// A repository created for a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Browser URL.
    pub url: String,
    pub clone_url: String,
}

/// A running environment, addressable by `handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub handle: String,
}

/// The core trait for all workspace providers.
///
/// Each method blocks until the collaborator answers. None of them retry.
pub trait Provider: Send + Sync {
    /// Get the name of the provider (e.g., "devpod", "docker").
    fn name(&self) -> &'static str;

    /// Create the source repository for a workspace.
    fn provision_repository(&self, spec: &RepositorySpec) -> Result<RepositoryInfo>;

    /// Stand up an environment for `workspace_id` from the repository.
    fn provision_container(
        &self,
        workspace_id: &str,
        repository: &RepositoryInfo,
    ) -> Result<EnvironmentInfo>;

    /// Run the chat handler inside the environment with `message` as payload.
    ///
    /// A non-zero exit is returned as output, not as an error; only failures
    /// to run the command at all are errors.
    fn dispatch_command(&self, handle: &str, message: &str) -> Result<CommandOutput>;

    /// Stop the environment without destroying it.
    fn stop_environment(&self, handle: &str) -> Result<()>;

    /// Destroy the environment and its resources.
    fn delete_environment(&self, handle: &str) -> Result<()>;
}

/// Trait for the environment half of a provider (container lifecycle and exec).
pub trait EnvironmentBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn create(&self, workspace_id: &str, repository: &RepositoryInfo) -> Result<EnvironmentInfo>;
    fn exec_handler(&self, handle: &str, message: &str) -> Result<CommandOutput>;
    fn stop(&self, handle: &str) -> Result<()>;
    fn destroy(&self, handle: &str) -> Result<()>;
}

/// GitHub for repositories plus a container backend for environments.
pub struct WorkspaceProvider {
    repositories: github::GitHubRepositories,
    environments: Box<dyn EnvironmentBackend>,
}

impl WorkspaceProvider {
    pub fn new(
        repositories: github::GitHubRepositories,
        environments: Box<dyn EnvironmentBackend>,
    ) -> Self {
        Self {
            repositories,
            environments,
        }
    }
}

impl Provider for WorkspaceProvider {
    fn name(&self) -> &'static str {
        self.environments.name()
    }

    fn provision_repository(&self, spec: &RepositorySpec) -> Result<RepositoryInfo> {
        self.repositories.generate(spec)
    }

    fn provision_container(
        &self,
        workspace_id: &str,
        repository: &RepositoryInfo,
    ) -> Result<EnvironmentInfo> {
        self.environments.create(workspace_id, repository)
    }

    fn dispatch_command(&self, handle: &str, message: &str) -> Result<CommandOutput> {
        self.environments.exec_handler(handle, message)
    }

    fn stop_environment(&self, handle: &str) -> Result<()> {
        self.environments.stop(handle)
    }

    fn delete_environment(&self, handle: &str) -> Result<()> {
        self.environments.destroy(handle)
    }
}

/// Build the provider selected by `config.container`.
pub fn get_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let environments: Box<dyn EnvironmentBackend> = match config.container {
        ContainerBackend::Mock => return Ok(Arc::new(mock::MockProvider::new())),
        ContainerBackend::Devpod => Box::new(devpod::DevPodEnvironments::new(config)?),
        ContainerBackend::Docker => Box::new(docker::DockerEnvironments::new(config)?),
    };

    let repositories = github::GitHubRepositories::new(config)?;
    Ok(Arc::new(WorkspaceProvider::new(repositories, environments)))
}

/// Shell command line running the handler with `message` as a single argument.
pub(crate) fn handler_invocation(handler_command: &str, message: &str) -> String {
    format!(
        "{} {}",
        handler_command.trim(),
        aiw_core::shell_quote(message)
    )
}
