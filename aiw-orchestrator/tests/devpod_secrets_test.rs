//! A failing `devpod up` must not carry the Anthropic key into the record.
#![cfg(unix)]

use aiw_orchestrator::test_utils::test_settings;
use aiw_orchestrator::{MemoryRegistry, WorkspaceOrchestrator, WorkspaceState};
use aiw_provider::devpod::DevPodEnvironments;
use aiw_provider::{
    CommandOutput, EnvironmentBackend, EnvironmentInfo, Provider, ProviderConfig, RepositoryInfo,
    RepositorySpec, Result,
};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

const API_KEY: &str = "sk-ant-SECRET123";

/// Canned repository, real devpod backend.
struct DevPodOnly(DevPodEnvironments);

impl Provider for DevPodOnly {
    fn name(&self) -> &'static str {
        "devpod"
    }

    fn provision_repository(&self, spec: &RepositorySpec) -> Result<RepositoryInfo> {
        Ok(RepositoryInfo {
            url: format!("https://x/{}", spec.name),
            clone_url: format!("https://x/{}.git", spec.name),
        })
    }

    fn provision_container(
        &self,
        workspace_id: &str,
        repository: &RepositoryInfo,
    ) -> Result<EnvironmentInfo> {
        self.0.create(workspace_id, repository)
    }

    fn dispatch_command(&self, handle: &str, message: &str) -> Result<CommandOutput> {
        self.0.exec_handler(handle, message)
    }

    fn stop_environment(&self, handle: &str) -> Result<()> {
        self.0.stop(handle)
    }

    fn delete_environment(&self, handle: &str) -> Result<()> {
        self.0.destroy(handle)
    }
}

/// A `devpod` that echoes its arguments to stderr and fails.
fn failing_devpod(dir: &Path) -> String {
    let path = dir.join("devpod");
    std::fs::write(&path, "#!/bin/sh\necho \"devpod $@\" >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_devpod_up_keeps_api_key_out_of_record() {
    let dir = tempfile::tempdir().unwrap();
    let environments = DevPodEnvironments::new(&ProviderConfig {
        devpod_binary: failing_devpod(dir.path()),
        anthropic_api_key: Some(API_KEY.to_string()),
        ..ProviderConfig::mock()
    })
    .unwrap();

    let orchestrator = WorkspaceOrchestrator::new(
        Arc::new(MemoryRegistry::new()),
        Arc::new(DevPodOnly(environments)),
        test_settings(),
    );

    let err = orchestrator
        .create_workspace(aiw_orchestrator::CreateWorkspaceRequest {
            name: "demo".to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(!err.to_string().contains(API_KEY), "{err}");

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Failed);
    let last_error = record.last_error.clone().unwrap();
    assert!(last_error.contains("devpod up"), "{last_error}");

    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains(API_KEY), "{json}");
}
