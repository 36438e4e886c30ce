use crate::chat::{parse_handler_output, ChatExchange};
use crate::error::{OrchestratorError, Result};
use crate::events::{ChatOrigin, EventBus, WorkspaceEvent};
use crate::ids::IdStrategy;
use crate::registry::{unchanged, WorkspaceRegistry};
use crate::workspace::{CreateWorkspaceRequest, WorkspaceRecord, WorkspaceState};
use aiw_core::validate_workspace_name;
use aiw_provider::{Provider, ProviderError, RepositorySpec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::workspace::WorkspaceState::*;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound for one chat dispatch.
    pub chat_timeout: Duration,
    /// Upper bound for each provisioning, stop and delete call.
    pub provision_timeout: Duration,
    pub id_strategy: IdStrategy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            chat_timeout: Duration::from_secs(300),
            provision_timeout: Duration::from_secs(900),
            id_strategy: IdStrategy::Suffixed,
        }
    }
}

/// Drives workspaces through their lifecycle.
///
/// Holds no record state of its own: every read and write goes through the
/// registry. Collaborator calls run on the blocking pool under a timeout; a
/// timed-out call keeps running in the background but its result is ignored.
#[derive(Clone)]
pub struct WorkspaceOrchestrator {
    registry: Arc<dyn WorkspaceRegistry>,
    provider: Arc<dyn Provider>,
    settings: OrchestratorSettings,
    events: EventBus,
    chat_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl WorkspaceOrchestrator {
    pub fn new(
        registry: Arc<dyn WorkspaceRegistry>,
        provider: Arc<dyn Provider>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            provider,
            settings,
            events: EventBus::default(),
            chat_locks: Arc::default(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn WorkspaceRegistry> {
        &self.registry
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Create a workspace and provision it to `ready`.
    ///
    /// Returns once provisioning has finished one way or the other. A
    /// collaborator failure leaves the record `failed` with `last_error` set
    /// and is returned as [`OrchestratorError::Provisioning`].
    #[instrument(skip(self, req), fields(name = %req.name, workspace_id = tracing::field::Empty))]
    pub async fn create_workspace(&self, req: CreateWorkspaceRequest) -> Result<WorkspaceRecord> {
        let slug = validate_workspace_name(&req.name)
            .map_err(|e| OrchestratorError::InvalidInput(e.to_string()))?;
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let id = self.settings.id_strategy.generate(&slug);
        Span::current().record("workspace_id", id.as_str());

        let record = self
            .registry
            .create(&id, req.name.trim(), description.clone())
            .await?;
        self.publish_state(&record);

        // Repository
        let record = self
            .registry
            .transition(&id, &[Pending], ProvisioningRepo, unchanged())
            .await?;
        self.publish_state(&record);

        let spec = RepositorySpec {
            name: id.clone(),
            description,
        };
        let repository = match self
            .call_provider("repository provisioning", self.settings.provision_timeout, move |p| {
                p.provision_repository(&spec)
            })
            .await
        {
            Ok(repository) => repository,
            Err(e) => return Err(self.fail_provisioning(&id, ProvisioningRepo, e).await),
        };
        info!(url = %repository.url, "Repository created");

        let (url, clone_url) = (repository.url.clone(), repository.clone_url.clone());
        let record = self
            .registry
            .transition(
                &id,
                &[ProvisioningRepo],
                ProvisioningContainer,
                Box::new(move |r| {
                    r.repository_url = Some(url.clone());
                    r.clone_url = Some(clone_url.clone());
                }),
            )
            .await?;
        self.publish_state(&record);

        // Environment
        let workspace_id = id.clone();
        let environment = match self
            .call_provider("container provisioning", self.settings.provision_timeout, move |p| {
                p.provision_container(&workspace_id, &repository)
            })
            .await
        {
            Ok(environment) => environment,
            Err(e) => return Err(self.fail_provisioning(&id, ProvisioningContainer, e).await),
        };
        info!(handle = %environment.handle, "Environment ready");

        let record = self
            .registry
            .transition(
                &id,
                &[ProvisioningContainer],
                Ready,
                Box::new(move |r| r.container_handle = Some(environment.handle.clone())),
            )
            .await?;
        self.publish_state(&record);

        Ok(record)
    }

    pub async fn get_workspace(&self, id: &str) -> Result<WorkspaceRecord> {
        self.registry.get(id).await
    }

    pub async fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>> {
        self.registry.list().await
    }

    pub async fn dispatch_chat(&self, id: &str, text: &str) -> Result<ChatExchange> {
        self.dispatch_chat_from(id, text, ChatOrigin::Http).await
    }

    /// Forward `text` to the handler inside the workspace environment.
    ///
    /// Only lookup problems are errors. Anything that goes wrong with the
    /// handler itself yields an exchange with `success == false` and the
    /// generic message; the cause is logged.
    #[instrument(skip(self, text), fields(workspace_id = %id))]
    pub async fn dispatch_chat_from(
        &self,
        id: &str,
        text: &str,
        origin: ChatOrigin,
    ) -> Result<ChatExchange> {
        if text.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Message must not be empty".to_string(),
            ));
        }
        self.ready_handle(id).await?;

        let lock = self.chat_lock(id);
        let _guard = lock.lock().await;

        // The workspace may have been stopped while we waited for the lock.
        let handle = self.ready_handle(id).await?;

        let message = text.to_string();
        let outcome = self
            .call_provider("chat dispatch", self.settings.chat_timeout, move |p| {
                p.dispatch_command(&handle, &message)
            })
            .await
            .and_then(|output| parse_handler_output(&output).map_err(OrchestratorError::Dispatch));

        let exchange = match outcome {
            Ok(response) => {
                self.registry.touch(id).await?;
                ChatExchange::succeeded(id, text, response)
            }
            Err(e) => {
                warn!("Chat dispatch failed: {}", e);
                ChatExchange::failed(id, text)
            }
        };

        self.events.publish(WorkspaceEvent::Chat {
            exchange: exchange.clone(),
            origin,
        });
        Ok(exchange)
    }

    /// Stop the environment; `ready|failed -> stopped`.
    ///
    /// Waits for an in-flight chat on the workspace to finish first.
    #[instrument(skip(self), fields(workspace_id = %id))]
    pub async fn stop_workspace(&self, id: &str) -> Result<WorkspaceRecord> {
        let lock = self.chat_lock(id);
        let _guard = lock.lock().await;
        self.stop_locked(id).await
    }

    /// Stop `id` only if it is still idle and no chat is running on it.
    ///
    /// Returns `Ok(None)` when the workspace was skipped.
    #[instrument(skip(self), fields(workspace_id = %id))]
    pub async fn stop_if_idle(
        &self,
        id: &str,
        idle_for: Duration,
    ) -> Result<Option<WorkspaceRecord>> {
        let lock = self.chat_lock(id);
        let Ok(_guard) = lock.try_lock() else {
            debug!("Chat in flight, not stopping");
            return Ok(None);
        };

        // Activity may have landed between the idle scan and taking the lock.
        let record = self.registry.get(id).await?;
        if !record.is_idle_since(idle_cutoff(idle_for)?) {
            debug!("Workspace became active, not stopping");
            return Ok(None);
        }
        self.stop_locked(id).await.map(Some)
    }

    async fn stop_locked(&self, id: &str) -> Result<WorkspaceRecord> {
        let record = self.registry.get(id).await?;
        Self::check_transition(&record, Stopped)?;

        if let Some(handle) = record.container_handle.clone() {
            self.run_teardown(id, "stop", move |p| p.stop_environment(&handle))
                .await?;
        }

        let record = self
            .registry
            .transition(id, &[Ready, Failed], Stopped, unchanged())
            .await?;
        info!("Workspace stopped");
        self.publish_state(&record);
        Ok(record)
    }

    /// Destroy the environment; `ready|failed|stopped -> deleted`.
    ///
    /// The repository is left in place.
    #[instrument(skip(self), fields(workspace_id = %id))]
    pub async fn delete_workspace(&self, id: &str) -> Result<WorkspaceRecord> {
        let lock = self.chat_lock(id);
        let _guard = lock.lock().await;

        let record = self.registry.get(id).await?;
        Self::check_transition(&record, Deleted)?;

        if let Some(handle) = record.container_handle.clone() {
            self.run_teardown(id, "delete", move |p| p.delete_environment(&handle))
                .await?;
        }

        let record = self
            .registry
            .transition(id, &[Ready, Failed, Stopped], Deleted, unchanged())
            .await?;
        info!("Workspace deleted");
        self.chat_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        self.publish_state(&record);
        Ok(record)
    }

    /// `ready` workspaces whose last activity is older than `idle_for`.
    pub async fn idle_workspaces(&self, idle_for: Duration) -> Result<Vec<WorkspaceRecord>> {
        let cutoff = idle_cutoff(idle_for)?;

        Ok(self
            .registry
            .list()
            .await?
            .into_iter()
            .filter(|w| w.is_idle_since(cutoff))
            .collect())
    }

    fn check_transition(record: &WorkspaceRecord, next: WorkspaceState) -> Result<()> {
        if record.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                id: record.id.clone(),
                from: record.state,
                to: next,
            })
        }
    }

    async fn ready_handle(&self, id: &str) -> Result<String> {
        let record = self.registry.get(id).await?;
        if record.state != Ready {
            return Err(OrchestratorError::NotReady {
                id: id.to_string(),
                state: record.state,
            });
        }
        record.container_handle.ok_or_else(|| {
            OrchestratorError::InvalidState(format!("ready workspace {} has no container", id))
        })
    }

    fn chat_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.chat_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Run a stop/delete collaborator call; failures are recorded on the record.
    async fn run_teardown<F>(&self, id: &str, operation: &str, call: F) -> Result<()>
    where
        F: FnOnce(&dyn Provider) -> aiw_provider::Result<()> + Send + 'static,
    {
        if let Err(e) = self
            .call_provider(operation, self.settings.provision_timeout, call)
            .await
        {
            error!("Workspace {} failed: {}", operation, e);
            self.registry.record_error(id, Some(e.to_string())).await?;
            return Err(e);
        }
        Ok(())
    }

    /// Record a provisioning failure and build the error returned to the caller.
    async fn fail_provisioning(
        &self,
        id: &str,
        from: WorkspaceState,
        err: OrchestratorError,
    ) -> OrchestratorError {
        let detail = err.to_string();
        error!(state = %from, "Provisioning failed: {}", detail);

        let message = detail.clone();
        match self
            .registry
            .transition(
                id,
                &[from],
                Failed,
                Box::new(move |r| r.last_error = Some(message.clone())),
            )
            .await
        {
            Ok(record) => self.publish_state(&record),
            Err(e) => error!("Could not mark workspace failed: {}", e),
        }

        match err {
            OrchestratorError::Timeout { .. } => err,
            _ => OrchestratorError::Provisioning {
                id: id.to_string(),
                detail,
            },
        }
    }

    /// Run a blocking provider call under `limit`.
    async fn call_provider<T, F>(&self, operation: &str, limit: Duration, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Provider) -> aiw_provider::Result<T> + Send + 'static,
    {
        let provider = self.provider.clone();
        let task = tokio::task::spawn_blocking(move || call(provider.as_ref()));

        match tokio::time::timeout(limit, task).await {
            Err(_) => Err(OrchestratorError::Timeout {
                operation: operation.to_string(),
                seconds: limit.as_secs(),
            }),
            Ok(Err(join_error)) => Err(OrchestratorError::Internal(format!(
                "{} task failed: {}",
                operation, join_error
            ))),
            // A command that timed out on its own is still a timeout, not a failure.
            Ok(Ok(Err(ProviderError::Timeout { seconds, .. }))) => Err(OrchestratorError::Timeout {
                operation: operation.to_string(),
                seconds,
            }),
            Ok(Ok(result)) => result.map_err(OrchestratorError::from),
        }
    }

    fn publish_state(&self, record: &WorkspaceRecord) {
        self.events.publish(WorkspaceEvent::StateChanged {
            workspace: record.clone(),
        });
    }
}

fn idle_cutoff(idle_for: Duration) -> Result<chrono::DateTime<chrono::Utc>> {
    let idle_for = chrono::Duration::from_std(idle_for)
        .map_err(|e| OrchestratorError::InvalidInput(e.to_string()))?;
    Ok(chrono::Utc::now() - idle_for)
}
