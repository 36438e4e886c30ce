//! Environments run as plain Docker containers.
//!
//! The container is started idle, the workspace repository is cloned into
//! `/workspace`, and chat messages run the handler with `docker exec`.

use crate::config::{ProviderConfig, ResourceLimits};
use crate::error::{ProviderError, Result};
use crate::{handler_invocation, EnvironmentBackend, EnvironmentInfo, RepositoryInfo};
use aiw_core::{is_tool_installed, run_checked, run_command, CommandOutput};
use tracing::{info, warn};

const WORKDIR: &str = "/workspace";
const LABEL: &str = "aiw.workspace";

/// Builder for Docker command lines.
#[derive(Debug, Clone, Default)]
pub struct DockerCommand {
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl DockerCommand {
    /// Create a new Docker command builder for `subcommand` (e.g., "run", "exec").
    pub fn new(subcommand: &str) -> Self {
        Self {
            args: vec![subcommand.to_string()],
            envs: Vec::new(),
        }
    }

    /// Add a single argument to the command.
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a flag with a value only when the value is present.
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }

    /// Set an environment variable on the docker CLI process itself.
    ///
    /// Paired with `-e NAME` this hands a secret to the container without
    /// putting it on the command line.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn execute(self, timeout_secs: Option<u64>) -> Result<CommandOutput> {
        Ok(run_checked("docker", &self.args, &self.envs, timeout_secs)?)
    }

    pub fn execute_raw(self, timeout_secs: Option<u64>) -> Result<CommandOutput> {
        Ok(run_command("docker", &self.args, &self.envs, timeout_secs)?)
    }
}

pub struct DockerEnvironments {
    image: String,
    handler_command: String,
    limits: ResourceLimits,
    github_token: Option<String>,
    anthropic_api_key: Option<String>,
    command_timeout_secs: Option<u64>,
}

impl DockerEnvironments {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if !is_tool_installed("docker") {
            return Err(ProviderError::DependencyNotFound("docker".to_string()));
        }
        Ok(Self::unchecked(config))
    }

    fn unchecked(config: &ProviderConfig) -> Self {
        Self {
            image: config.docker_image.clone(),
            handler_command: config.handler_command.clone(),
            limits: config.limits.clone(),
            github_token: config.github_token.clone(),
            anthropic_api_key: config.anthropic_api_key.clone(),
            command_timeout_secs: config.command_timeout_secs,
        }
    }

    pub fn container_name(workspace_id: &str) -> String {
        format!("aiw-{}", workspace_id)
    }

    fn run_command(&self, workspace_id: &str) -> DockerCommand {
        let storage = self.limits.storage.as_ref().map(|s| format!("size={}", s));
        let mut cmd = DockerCommand::new("run")
            .arg("-d")
            .arg("--name")
            .arg(Self::container_name(workspace_id))
            .arg("--label")
            .arg(format!("{}={}", LABEL, workspace_id))
            .opt("--cpus", self.limits.cpus.as_deref())
            .opt("--memory", self.limits.memory.as_deref())
            .opt("--storage-opt", storage.as_deref());

        if let Some(key) = &self.anthropic_api_key {
            cmd = cmd.arg("-e").arg("ANTHROPIC_API_KEY").env("ANTHROPIC_API_KEY", key);
        }

        cmd.arg(&self.image).arg("sleep").arg("infinity")
    }

    fn clone_command(&self, handle: &str, repository: &RepositoryInfo) -> DockerCommand {
        // The token stays in the exec environment; the shell splices it into the URL.
        let script = match repository.clone_url.strip_prefix("https://") {
            Some(rest) if self.github_token.is_some() => format!(
                "git clone \"https://x-access-token:${{GITHUB_TOKEN}}@{}\" {}",
                rest, WORKDIR
            ),
            _ => format!("git clone \"{}\" {}", repository.clone_url, WORKDIR),
        };

        let mut cmd = DockerCommand::new("exec");
        if let Some(token) = &self.github_token {
            cmd = cmd.arg("-e").arg("GITHUB_TOKEN").env("GITHUB_TOKEN", token);
        }
        cmd.arg(handle).arg("sh").arg("-c").arg(script)
    }

    fn exec_command(&self, handle: &str, message: &str) -> DockerCommand {
        DockerCommand::new("exec")
            .arg("-w")
            .arg(WORKDIR)
            .arg(handle)
            .arg("sh")
            .arg("-c")
            .arg(handler_invocation(&self.handler_command, message))
    }
}

impl EnvironmentBackend for DockerEnvironments {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn create(&self, workspace_id: &str, repository: &RepositoryInfo) -> Result<EnvironmentInfo> {
        let handle = Self::container_name(workspace_id);
        info!(workspace_id, container = %handle, image = %self.image, "docker run");
        self.run_command(workspace_id)
            .execute(self.command_timeout_secs)?;

        if let Err(e) = self
            .clone_command(&handle, repository)
            .execute(self.command_timeout_secs)
        {
            // The container is useless without the checkout.
            if let Err(cleanup) = self.destroy(&handle) {
                warn!(container = %handle, "Failed to remove container after clone error: {}", cleanup);
            }
            return Err(e);
        }

        Ok(EnvironmentInfo { handle })
    }

    fn exec_handler(&self, handle: &str, message: &str) -> Result<CommandOutput> {
        self.exec_command(handle, message)
            .execute_raw(self.command_timeout_secs)
    }

    fn stop(&self, handle: &str) -> Result<()> {
        DockerCommand::new("stop")
            .arg(handle)
            .execute(self.command_timeout_secs)?;
        Ok(())
    }

    fn destroy(&self, handle: &str) -> Result<()> {
        DockerCommand::new("rm")
            .arg("-f")
            .arg(handle)
            .execute(self.command_timeout_secs)?;
        Ok(())
    }
}
