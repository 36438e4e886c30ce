//! Environments managed by the `devpod` CLI.
//!
//! The DevPod workspace id doubles as the environment handle.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::{handler_invocation, EnvironmentBackend, EnvironmentInfo, RepositoryInfo};
use aiw_core::{is_tool_installed, run_checked, run_command, CommandOutput};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub struct DevPodEnvironments {
    binary: String,
    provider: String,
    handler_command: String,
    anthropic_api_key: Option<String>,
    command_timeout_secs: Option<u64>,
}

impl DevPodEnvironments {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if !is_tool_installed(&config.devpod_binary) {
            return Err(ProviderError::DependencyNotFound(
                config.devpod_binary.clone(),
            ));
        }
        if !config.limits.is_empty() {
            warn!(
                "Resource limits are not passed to devpod; configure them on the '{}' devpod provider",
                config.devpod_provider
            );
        }

        Ok(Self::unchecked(config))
    }

    fn unchecked(config: &ProviderConfig) -> Self {
        Self {
            binary: config.devpod_binary.clone(),
            provider: config.devpod_provider.clone(),
            handler_command: config.handler_command.clone(),
            anthropic_api_key: config.anthropic_api_key.clone(),
            command_timeout_secs: config.command_timeout_secs,
        }
    }

    /// Secrets for the workspace go through a private env file, never argv,
    /// so they stay out of `ps`, logs and recorded errors.
    fn workspace_env_file(&self) -> Result<Option<NamedTempFile>> {
        let Some(key) = &self.anthropic_api_key else {
            return Ok(None);
        };
        let mut file = tempfile::Builder::new()
            .prefix("aiw-devpod-")
            .suffix(".env")
            .tempfile()?;
        writeln!(file, "ANTHROPIC_API_KEY={}", key)?;
        file.flush()?;
        Ok(Some(file))
    }

    fn up_args(
        &self,
        workspace_id: &str,
        repository: &RepositoryInfo,
        env_file: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "up".to_string(),
            repository.clone_url.clone(),
            "--id".to_string(),
            workspace_id.to_string(),
            "--provider".to_string(),
            self.provider.clone(),
            "--ide".to_string(),
            "none".to_string(),
        ];
        if let Some(path) = env_file {
            args.push("--workspace-env-file".to_string());
            args.push(path.display().to_string());
        }
        args
    }

    fn ssh_args(&self, handle: &str, message: &str) -> Vec<String> {
        vec![
            "ssh".to_string(),
            handle.to_string(),
            "--command".to_string(),
            handler_invocation(&self.handler_command, message),
        ]
    }
}

impl EnvironmentBackend for DevPodEnvironments {
    fn name(&self) -> &'static str {
        "devpod"
    }

    fn create(&self, workspace_id: &str, repository: &RepositoryInfo) -> Result<EnvironmentInfo> {
        info!(workspace_id, provider = %self.provider, "devpod up");
        // Removed when dropped, after devpod has read it.
        let env_file = self.workspace_env_file()?;
        run_checked(
            &self.binary,
            &self.up_args(workspace_id, repository, env_file.as_ref().map(|f| f.path())),
            &[],
            self.command_timeout_secs,
        )?;

        Ok(EnvironmentInfo {
            handle: workspace_id.to_string(),
        })
    }

    fn exec_handler(&self, handle: &str, message: &str) -> Result<CommandOutput> {
        Ok(run_command(
            &self.binary,
            &self.ssh_args(handle, message),
            &[],
            self.command_timeout_secs,
        )?)
    }

    fn stop(&self, handle: &str) -> Result<()> {
        run_checked(&self.binary, &["stop", handle], &[], self.command_timeout_secs)?;
        Ok(())
    }

    fn destroy(&self, handle: &str) -> Result<()> {
        run_checked(
            &self.binary,
            &["delete", handle, "--force"],
            &[],
            self.command_timeout_secs,
        )?;
        Ok(())
    }
}
