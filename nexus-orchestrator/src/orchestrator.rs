use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use nexus_ports::PortAllocator;
use nexus_provider::{CreateHint, ExecutionHandle, Provider, ProviderRegistry};
use parking_lot::RwLock;
use tracing::{error, info, instrument, warn, Instrument};

use crate::bootstrap::{listening_ports_command, ssh_setup_command};
use crate::config::OrchestratorConfig;
use crate::deps::resolve_service_order;
use crate::error::{bounded, OrchestratorError, Result, Stage};
use crate::health::HealthProbe;
use crate::request::{CreateWorkspaceRequest, ServiceDefinition};
use crate::services::{apply_health, ServiceSupervisor};
use crate::state::{ManagedWorkspace, ServiceBatch};
use crate::status::{
    ServiceStatus, WorkspaceCreateResult, WorkspaceInfo, WorkspaceStatus, WorkspaceStatusUpdate,
};

struct Inner {
    providers: ProviderRegistry,
    ports: PortAllocator,
    /// Lock order: this map, then a workspace's state, then the allocator.
    workspaces: RwLock<HashMap<String, Arc<ManagedWorkspace>>>,
    config: OrchestratorConfig,
}

/// Owns every workspace on this host and drives them through their provider.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone)]
pub struct WorkspaceOrchestrator {
    inner: Arc<Inner>,
}

impl WorkspaceOrchestrator {
    pub fn new(providers: ProviderRegistry, config: OrchestratorConfig) -> Result<Self> {
        let ports = PortAllocator::new(config.shell_ports, config.service_ports)?;
        Ok(Self {
            inner: Arc::new(Inner {
                providers,
                ports,
                workspaces: RwLock::new(HashMap::new()),
                config,
            }),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.inner.ports
    }

    fn lookup(&self, workspace_id: &str) -> Result<Arc<ManagedWorkspace>> {
        self.inner
            .workspaces
            .read()
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(workspace_id.to_string()))
    }

    fn provider_for(&self, workspace: &ManagedWorkspace) -> Result<Arc<dyn Provider>> {
        let name = &workspace.request.provider;
        self.inner
            .providers
            .get(name)
            .ok_or_else(|| OrchestratorError::ProviderUnavailable(name.clone()))
    }

    /// Provision a workspace and bring up its remote shell.
    ///
    /// Rejected requests (invalid, no shell port left, id already taken) are
    /// errors and leave nothing behind. Once accepted, a provisioning failure
    /// is reported as a result in `error` status; the execution context is
    /// torn down and the shell port released before returning.
    #[instrument(skip(self, request), fields(workspace_id = %request.workspace_id))]
    pub async fn create_workspace(
        &self,
        request: CreateWorkspaceRequest,
    ) -> Result<WorkspaceCreateResult> {
        request.validate()?;

        let shell_port = self.inner.ports.allocate_shell_port()?;
        let workspace = Arc::new(ManagedWorkspace::new(request, shell_port));
        {
            let mut registry = self.inner.workspaces.write();
            if registry.contains_key(workspace.id()) {
                drop(registry);
                self.inner.ports.release_port(shell_port);
                return Err(OrchestratorError::AlreadyExists(workspace.id().to_string()));
            }
            registry.insert(workspace.id().to_string(), Arc::clone(&workspace));
        }
        info!(shell_port, provider = %workspace.request.provider, "creating workspace");

        // Detached so a dropped caller cannot strand the record in `creating`.
        let orchestrator = self.clone();
        let task_workspace = Arc::clone(&workspace);
        let provisioning = tokio::spawn(
            async move { orchestrator.finish_creation(&task_workspace, shell_port).await }
                .in_current_span(),
        );
        match provisioning.await {
            Ok(result) => Ok(result),
            Err(e) => {
                let message = format!("provisioning task failed: {e}");
                Ok(self.abandon_creation(&workspace, message))
            }
        }
    }

    async fn finish_creation(
        &self,
        workspace: &ManagedWorkspace,
        shell_port: u16,
    ) -> WorkspaceCreateResult {
        let Some(provider) = self.inner.providers.get(&workspace.request.provider) else {
            let message = format!("provider {} not available", workspace.request.provider);
            return self.abandon_creation(workspace, message);
        };

        if let Err(e) = self.provision(workspace, provider.as_ref(), shell_port).await {
            return self.abandon_creation(workspace, e.to_string());
        }

        let mut state = workspace.state.write();
        state.set_status(WorkspaceStatus::Running);
        info!(shell_port, "workspace running");
        WorkspaceCreateResult {
            workspace_id: workspace.id().to_string(),
            execution_handle: state.handle.clone(),
            status: WorkspaceStatus::Running,
            shell_port: Some(shell_port),
            error: None,
            timestamp: Utc::now(),
        }
    }

    async fn provision(
        &self,
        workspace: &ManagedWorkspace,
        provider: &dyn Provider,
        shell_port: u16,
    ) -> Result<()> {
        let config = &self.inner.config;
        let request = &workspace.request;
        let id = workspace.id();

        let hint = CreateHint {
            image: request.image.clone(),
            cpus: request.resources.cpu,
            memory: request.resources.memory.clone(),
            disk: request.resources.disk.clone(),
            shell_port: Some(shell_port),
            labels: BTreeMap::from([
                ("nexus.branch".to_string(), request.repository.branch.clone()),
                (
                    "nexus.repository".to_string(),
                    format!("{}/{}", request.repository.owner, request.repository.name),
                ),
            ]),
        };
        let path = config.workspace_root.join(id);

        let handle = match bounded(
            Stage::Create,
            config.provision_timeout(),
            provider.create(id, &path, &hint),
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.tear_down(workspace, provider, false).await;
                return Err(e);
            }
        };
        info!(workspace_id = id, context = %handle.name, "execution context created");
        workspace.state.write().handle = Some(handle);

        if let Err(e) = bounded(Stage::Start, config.provision_timeout(), provider.start(id)).await {
            self.tear_down(workspace, provider, false).await;
            return Err(e);
        }

        let setup = ssh_setup_command(&request.ssh);
        if let Err(e) = bounded(
            Stage::Bootstrap,
            config.bootstrap_timeout(),
            provider.exec(id, &setup),
        )
        .await
        {
            self.tear_down(workspace, provider, true).await;
            return Err(e);
        }

        if let Err(e) = bounded(
            Stage::Exec,
            config.provision_timeout(),
            provider.exec(id, &listening_ports_command()),
        )
        .await
        {
            warn!(workspace_id = id, error = %e, "could not verify sshd is listening, continuing");
        }
        Ok(())
    }

    /// Best-effort removal of a half-provisioned context. Failures are logged.
    async fn tear_down(&self, workspace: &ManagedWorkspace, provider: &dyn Provider, stop_first: bool) {
        let config = &self.inner.config;
        let id = workspace.id();

        if stop_first {
            if let Err(e) = bounded(Stage::Stop, config.stop_timeout(), provider.stop(id)).await {
                warn!(workspace_id = id, error = %e, "cleanup stop failed");
            }
        }
        match bounded(Stage::Destroy, config.destroy_timeout(), provider.destroy(id)).await {
            Ok(()) => workspace.state.write().handle = None,
            Err(e) => warn!(workspace_id = id, error = %e, "cleanup destroy failed"),
        }
    }

    fn abandon_creation(&self, workspace: &ManagedWorkspace, message: String) -> WorkspaceCreateResult {
        error!(workspace_id = workspace.id(), error = %message, "workspace creation failed");
        let mut state = workspace.state.write();
        state.fail(message.clone());
        if let Some(port) = state.shell_port.take() {
            self.inner.ports.release_port(port);
        }
        WorkspaceCreateResult {
            workspace_id: workspace.id().to_string(),
            execution_handle: state.handle.clone(),
            status: WorkspaceStatus::Error,
            shell_port: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }

    /// Start every service of a running workspace in dependency order.
    ///
    /// A dependency cycle fails the whole call before anything starts.
    /// Individual service failures are recorded on the service and named in
    /// the returned update's `error`.
    #[instrument(skip(self))]
    pub async fn start_services(&self, workspace_id: &str) -> Result<WorkspaceStatusUpdate> {
        let workspace = self.lookup(workspace_id)?;
        let provider = self.provider_for(&workspace)?;
        let _batch = {
            let mut state = workspace.state.write();
            if state.status != WorkspaceStatus::Running {
                return Err(OrchestratorError::InvalidState(format!(
                    "workspace {workspace_id} is {}, services can only start on a running workspace",
                    state.status
                )));
            }
            if state.service_batch {
                return Err(OrchestratorError::InvalidState(format!(
                    "services of workspace {workspace_id} are already starting"
                )));
            }
            ServiceBatch::begin(&workspace, &mut state)
        };

        let order: Vec<ServiceDefinition> = resolve_service_order(&workspace.request.services)?
            .into_iter()
            .cloned()
            .collect();
        info!(
            services = ?order.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "starting services"
        );

        let supervisor = ServiceSupervisor {
            provider,
            workspace: Arc::clone(&workspace),
            ports: &self.inner.ports,
            config: &self.inner.config,
        };
        let failed = supervisor.start_all(&order).await;

        let mut update = workspace.snapshot();
        if !failed.is_empty() {
            update.error = Some(format!(
                "{} of {} services failed to start: {}",
                failed.len(),
                order.len(),
                failed.join(", ")
            ));
        }
        Ok(update)
    }

    /// Stop the execution context. Ports and the workspace record are kept.
    #[instrument(skip(self))]
    pub async fn stop_workspace(&self, workspace_id: &str) -> Result<WorkspaceStatusUpdate> {
        let workspace = self.lookup(workspace_id)?;
        let provider = self.provider_for(&workspace)?;
        {
            let mut state = workspace.state.write();
            if matches!(state.status, WorkspaceStatus::Creating | WorkspaceStatus::Deleting) {
                return Err(OrchestratorError::InvalidState(format!(
                    "workspace {workspace_id} is {}",
                    state.status
                )));
            }
            if state.handle.is_none() {
                return Err(OrchestratorError::InvalidState(format!(
                    "workspace {workspace_id} has no execution context"
                )));
            }
            state.set_status(WorkspaceStatus::Stopped);
            state.abort_health_tasks();
            for service in state.services.values_mut() {
                if service.status != ServiceStatus::Error {
                    service.status = ServiceStatus::Stopped;
                }
            }
        }

        let stopped = bounded(
            Stage::Stop,
            self.inner.config.stop_timeout(),
            provider.stop(workspace_id),
        )
        .await;
        if let Err(e) = stopped {
            error!(error = %e, "failed to stop workspace");
            workspace.state.write().fail(e.to_string());
            return Err(e);
        }

        info!("workspace stopped");
        Ok(workspace.snapshot())
    }

    /// Destroy the execution context, give back every port, forget the workspace.
    ///
    /// When destroy fails the workspace keeps its previous status and ports.
    #[instrument(skip(self))]
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        let workspace = self.lookup(workspace_id)?;
        let (previous, has_context) = {
            let mut state = workspace.state.write();
            match state.status {
                WorkspaceStatus::Creating => {
                    return Err(OrchestratorError::InvalidState(format!(
                        "workspace {workspace_id} is still being created"
                    )))
                }
                WorkspaceStatus::Deleting => {
                    return Err(OrchestratorError::InvalidState(format!(
                        "workspace {workspace_id} is already being deleted"
                    )))
                }
                _ => {}
            }
            let previous = state.status;
            state.set_status(WorkspaceStatus::Deleting);
            state.abort_health_tasks();
            (previous, state.handle.is_some())
        };

        // Detached so a dropped caller cannot strand the record in `deleting`.
        let orchestrator = self.clone();
        let task_workspace = Arc::clone(&workspace);
        let teardown = tokio::spawn(
            async move {
                orchestrator
                    .finish_deletion(&task_workspace, previous, has_context)
                    .await
            }
            .in_current_span(),
        );
        match teardown.await {
            Ok(result) => result,
            Err(e) => {
                workspace.state.write().set_status(previous);
                Err(OrchestratorError::Aborted(format!(
                    "delete of workspace {workspace_id}: {e}"
                )))
            }
        }
    }

    async fn finish_deletion(
        &self,
        workspace: &ManagedWorkspace,
        previous: WorkspaceStatus,
        has_context: bool,
    ) -> Result<()> {
        let workspace_id = workspace.id();
        if has_context {
            let destroyed = match self.provider_for(workspace) {
                Ok(provider) => {
                    bounded(
                        Stage::Destroy,
                        self.inner.config.destroy_timeout(),
                        provider.destroy(workspace_id),
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = destroyed {
                error!(error = %e, "failed to delete workspace");
                workspace.state.write().set_status(previous);
                return Err(e);
            }
        }

        let released = {
            let mut registry = self.inner.workspaces.write();
            let mut state = workspace.state.write();
            let released = self.inner.ports.release_ports(state.take_ports());
            registry.remove(workspace_id);
            released
        };
        info!(released_ports = released, "workspace deleted");
        Ok(())
    }

    /// Snapshot of one workspace, `None` for unknown ids.
    pub fn get_workspace_status(&self, workspace_id: &str) -> Option<WorkspaceStatusUpdate> {
        self.lookup(workspace_id).ok().map(|w| w.snapshot())
    }

    /// Detailed view of one workspace, including ports and per-service health.
    pub fn describe_workspace(&self, workspace_id: &str) -> Option<WorkspaceInfo> {
        self.lookup(workspace_id).ok().map(|w| w.info())
    }

    /// Snapshots of every workspace, ordered by id.
    pub fn list_workspaces(&self) -> Vec<WorkspaceStatusUpdate> {
        let workspaces: Vec<_> = self.inner.workspaces.read().values().cloned().collect();
        let mut snapshots: Vec<_> = workspaces.iter().map(|w| w.snapshot()).collect();
        snapshots.sort_by(|a, b| a.workspace_id.cmp(&b.workspace_id));
        snapshots
    }

    pub fn workspace_count(&self) -> usize {
        self.inner.workspaces.read().len()
    }

    /// Ids of workspaces currently in `running` status.
    pub fn running_workspace_ids(&self) -> Vec<String> {
        let workspaces: Vec<_> = self.inner.workspaces.read().values().cloned().collect();
        let mut ids: Vec<_> = workspaces
            .iter()
            .filter(|w| w.state.read().status == WorkspaceStatus::Running)
            .map(|w| w.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Probe every live service of a running workspace once, concurrently.
    #[instrument(skip(self))]
    pub async fn check_services_health(&self, workspace_id: &str) -> Result<WorkspaceStatusUpdate> {
        let workspace = self.lookup(workspace_id)?;
        let provider = self.provider_for(&workspace)?;
        let default_timeout = self.inner.config.default_health_timeout();

        let probes: Vec<(String, HealthProbe)> = {
            let state = workspace.state.read();
            if state.status != WorkspaceStatus::Running {
                return Err(OrchestratorError::InvalidState(format!(
                    "workspace {workspace_id} is {}",
                    state.status
                )));
            }
            state
                .services
                .iter()
                .filter(|(_, service)| service.status.is_live())
                .filter_map(|(name, service)| {
                    HealthProbe::for_service(&service.definition, default_timeout)
                        .map(|probe| (name.clone(), probe))
                })
                .collect()
        };

        let provider = provider.as_ref();
        let outcomes = join_all(probes.iter().map(|(name, probe)| async move {
            (name, probe.run(provider, workspace_id).await)
        }))
        .await;
        for (name, outcome) in &outcomes {
            apply_health(&workspace, name, outcome);
        }

        Ok(workspace.snapshot())
    }

    /// Execution contexts the named backend currently reports.
    pub async fn list_execution_contexts(&self, provider: &str) -> Result<Vec<ExecutionHandle>> {
        let backend = self
            .inner
            .providers
            .get(provider)
            .ok_or_else(|| OrchestratorError::ProviderUnavailable(provider.to_string()))?;
        backend
            .list()
            .await
            .map_err(|source| OrchestratorError::Backend {
                stage: Stage::List,
                source,
            })
    }
}
