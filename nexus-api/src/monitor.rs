use nexus_orchestrator::{OrchestratorError, WorkspaceOrchestrator};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// Re-probe the services of every running workspace on a fixed interval.
pub async fn start_health_monitor_task(orchestrator: WorkspaceOrchestrator, interval_secs: u64) {
    let mut interval = interval(Duration::from_secs(interval_secs.max(1)));

    info!(
        "Health monitor running (checks every {} seconds)",
        interval_secs
    );

    loop {
        interval.tick().await;
        check_running_workspaces(&orchestrator).await;
    }
}

pub async fn check_running_workspaces(orchestrator: &WorkspaceOrchestrator) {
    for id in orchestrator.running_workspace_ids() {
        match orchestrator.check_services_health(&id).await {
            Ok(update) => debug!(workspace_id = %id, services = ?update.services, "health check complete"),
            // Stopped or deleted since the id list was taken.
            Err(OrchestratorError::NotFound(_) | OrchestratorError::InvalidState(_)) => {}
            Err(e) => warn!(workspace_id = %id, error = %e, "health check failed"),
        }
    }
}
