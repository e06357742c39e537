//! Service supervision: ordered startup with retries, then health probes.

use std::sync::Arc;

use nexus_ports::PortAllocator;
use nexus_provider::{ExecOptions, Provider};
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{bounded, Stage};
use crate::health::{HealthOutcome, HealthProbe};
use crate::request::ServiceDefinition;
use crate::state::{ManagedService, ManagedWorkspace};
use crate::status::{ServiceStatus, WorkspaceStatus};

/// Directory the workspace checkout is mounted at inside the context.
const WORKSPACE_DIR: &str = "/workspace";

/// The exec call that launches `service`.
pub fn service_command(service: &ServiceDefinition) -> ExecOptions {
    ExecOptions::shell(format!("cd {WORKSPACE_DIR} && {}", service.command))
        .with_env(service.env.clone())
}

/// Starts one batch of services for one workspace.
pub(crate) struct ServiceSupervisor<'a> {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) workspace: Arc<ManagedWorkspace>,
    pub(crate) ports: &'a PortAllocator,
    pub(crate) config: &'a OrchestratorConfig,
}

impl ServiceSupervisor<'_> {
    /// Start `order` one service at a time. A failed service never stops the
    /// batch. Returns the names of the services that failed.
    pub(crate) async fn start_all(&self, order: &[ServiceDefinition]) -> Vec<String> {
        {
            let mut state = self.workspace.state.write();
            // Probes from an earlier batch must not land on restarted services.
            state.abort_health_tasks();
            for definition in order {
                state
                    .services
                    .entry(definition.name.clone())
                    .and_modify(|service| service.reset(definition))
                    .or_insert_with(|| ManagedService::new(definition.clone()));
            }
        }

        let mut failed = Vec::new();
        for definition in order {
            if !self.start_one(definition).await {
                failed.push(definition.name.clone());
            }
        }
        failed
    }

    async fn start_one(&self, definition: &ServiceDefinition) -> bool {
        let workspace_id = self.workspace.id();
        let name = definition.name.as_str();

        let Some(port) = self.claim_port(name) else {
            return false;
        };

        let provider = self.provider.as_ref();
        let opts = service_command(definition);
        let opts = &opts;
        let attempt_timeout = self.config.service_start_timeout();
        let result = self
            .config
            .retry
            .run(move |attempt| {
                debug!(workspace_id, service = name, attempt, "starting service");
                bounded(Stage::Exec, attempt_timeout, provider.exec(workspace_id, opts))
            })
            .await;

        let mut state = self.workspace.state.write();
        let Some(service) = state.services.get_mut(name) else {
            return false;
        };
        match result {
            Err(e) => {
                let message = format!(
                    "failed to start service {name} after {} attempts: {e}",
                    self.config.retry.max_attempts.max(1)
                );
                warn!(workspace_id, service = name, error = %e, "service failed to start");
                service.fail(message);
                false
            }
            // Stopped while the command was running.
            Ok(_) if service.status != ServiceStatus::Starting => false,
            Ok(_) => {
                service.mark_running();
                info!(workspace_id, service = name, port, "service started");
                if let Some(probe) =
                    HealthProbe::for_service(definition, self.config.default_health_timeout())
                {
                    let task = self.spawn_health_check(name.to_string(), probe);
                    state.track_health_task(task);
                }
                true
            }
        }
    }

    /// Reuse the service's traffic port or allocate one, and move it to
    /// `starting`. Allocation happens under the workspace lock so a concurrent
    /// delete either sees the port or refuses it.
    fn claim_port(&self, name: &str) -> Option<u16> {
        let workspace_id = self.workspace.id();
        let mut state = self.workspace.state.write();
        let workspace_status = state.status;
        let service = state.services.get_mut(name)?;

        if workspace_status != WorkspaceStatus::Running {
            if service.status == ServiceStatus::Pending {
                service.fail(format!("workspace is {workspace_status}"));
            }
            return None;
        }

        let port = match service.mapped_port {
            Some(port) => port,
            None => match self.ports.allocate_service_port() {
                Ok(port) => port,
                Err(e) => {
                    warn!(workspace_id, service = name, error = %e, "no traffic port for service");
                    service.fail(e.to_string());
                    return None;
                }
            },
        };
        service.mapped_port = Some(port);
        service.status = ServiceStatus::Starting;
        Some(port)
    }

    fn spawn_health_check(&self, name: String, probe: HealthProbe) -> tokio::task::JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let workspace = Arc::clone(&self.workspace);
        let settle = self.config.health_settle_delay();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let outcome = probe.run(provider.as_ref(), workspace.id()).await;
            apply_health(&workspace, &name, &outcome);
        })
    }
}

/// Record a probe result. Ignored when the workspace is no longer running or
/// the service has been stopped or restarted since the probe was scheduled.
pub(crate) fn apply_health(workspace: &ManagedWorkspace, name: &str, outcome: &HealthOutcome) -> bool {
    let mut state = workspace.state.write();
    if state.status != WorkspaceStatus::Running {
        return false;
    }
    let Some(service) = state.services.get_mut(name) else {
        return false;
    };
    if !service.status.is_live() {
        return false;
    }

    if let HealthOutcome::Unhealthy(reason) = outcome {
        if service.status != ServiceStatus::Unhealthy {
            warn!(workspace_id = workspace.id(), service = name, reason = %reason, "service unhealthy");
        }
    }
    service.record_health(outcome);
    true
}
