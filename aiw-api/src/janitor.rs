use aiw_orchestrator::WorkspaceOrchestrator;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Periodically stops ready workspaces with no activity for `idle_timeout`.
pub async fn start_janitor_task(
    orchestrator: WorkspaceOrchestrator,
    interval_secs: u64,
    idle_timeout: Duration,
) {
    let interval_secs = interval_secs.max(1);
    let mut interval = interval(Duration::from_secs(interval_secs));

    info!(
        "Janitor task running (checks every {} seconds, idle timeout {}s)",
        interval_secs,
        idle_timeout.as_secs()
    );

    loop {
        interval.tick().await;

        if let Err(e) = stop_idle_workspaces(&orchestrator, idle_timeout).await {
            error!("Janitor sweep failed: {}", e);
        }
    }
}

/// One sweep. Returns how many workspaces were stopped; individual failures
/// are logged and do not end the sweep.
pub async fn stop_idle_workspaces(
    orchestrator: &WorkspaceOrchestrator,
    idle_timeout: Duration,
) -> anyhow::Result<usize> {
    let idle = orchestrator.idle_workspaces(idle_timeout).await?;
    let mut stopped = 0;

    for workspace in idle {
        info!(
            workspace_id = %workspace.id,
            "Idle since {}, stopping workspace",
            workspace.last_activity_at
        );

        // Skips workspaces that are mid-chat or saw activity since the scan.
        match orchestrator.stop_if_idle(&workspace.id, idle_timeout).await {
            Ok(Some(_)) => stopped += 1,
            Ok(None) => debug!(workspace_id = %workspace.id, "Workspace busy, left running"),
            Err(e) => warn!(workspace_id = %workspace.id, "Failed to stop idle workspace: {}", e),
        }
    }

    Ok(stopped)
}
