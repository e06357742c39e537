//! In-memory records for accepted workspaces.
//!
//! A [`ManagedWorkspace`] is shared through an `Arc`. Its request never
//! changes; everything else sits behind the workspace's own lock and is only
//! touched while that lock is held.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nexus_provider::ExecutionHandle;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::health::HealthOutcome;
use crate::request::{CreateWorkspaceRequest, ServiceDefinition};
use crate::status::{
    HealthStatus, ServiceInfo, ServiceStatus, WorkspaceInfo, WorkspaceStatus,
    WorkspaceStatusUpdate,
};

pub(crate) struct ManagedWorkspace {
    pub(crate) request: CreateWorkspaceRequest,
    pub(crate) state: RwLock<WorkspaceState>,
}

impl ManagedWorkspace {
    pub(crate) fn new(request: CreateWorkspaceRequest, shell_port: u16) -> Self {
        let now = Utc::now();
        Self {
            request,
            state: RwLock::new(WorkspaceState {
                handle: None,
                status: WorkspaceStatus::Creating,
                shell_port: Some(shell_port),
                services: BTreeMap::new(),
                created_at: now,
                updated_at: now,
                error_message: None,
                health_tasks: Vec::new(),
                service_batch: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.request.workspace_id
    }

    pub(crate) fn snapshot(&self) -> WorkspaceStatusUpdate {
        self.state.read().snapshot(self.id())
    }

    pub(crate) fn info(&self) -> WorkspaceInfo {
        let state = self.state.read();
        WorkspaceInfo {
            workspace_id: self.request.workspace_id.clone(),
            workspace_name: self.request.workspace_name.clone(),
            provider: self.request.provider.clone(),
            status: state.status,
            execution_handle: state.handle.clone(),
            shell_port: state.shell_port,
            services: state.services.values().map(ManagedService::info).collect(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            error: state.error_message.clone(),
        }
    }
}

pub(crate) struct WorkspaceState {
    pub(crate) handle: Option<ExecutionHandle>,
    pub(crate) status: WorkspaceStatus,
    /// `None` once the port has gone back to the allocator.
    pub(crate) shell_port: Option<u16>,
    pub(crate) services: BTreeMap<String, ManagedService>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) error_message: Option<String>,
    pub(crate) health_tasks: Vec<JoinHandle<()>>,
    /// Set while a `start_services` batch is running for this workspace.
    pub(crate) service_batch: bool,
}

impl WorkspaceState {
    pub(crate) fn set_status(&mut self, status: WorkspaceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.set_status(WorkspaceStatus::Error);
    }

    /// Shell port plus every service traffic port, without giving them up.
    pub(crate) fn held_ports(&self) -> Vec<u16> {
        self.shell_port
            .into_iter()
            .chain(self.services.values().filter_map(|s| s.mapped_port))
            .collect()
    }

    /// Forget every held port. The caller releases them to the allocator.
    pub(crate) fn take_ports(&mut self) -> Vec<u16> {
        let ports = self.held_ports();
        self.shell_port = None;
        for service in self.services.values_mut() {
            service.mapped_port = None;
        }
        ports
    }

    pub(crate) fn track_health_task(&mut self, task: JoinHandle<()>) {
        self.health_tasks.retain(|t| !t.is_finished());
        self.health_tasks.push(task);
    }

    pub(crate) fn abort_health_tasks(&mut self) {
        for task in self.health_tasks.drain(..) {
            task.abort();
        }
    }

    pub(crate) fn snapshot(&self, workspace_id: &str) -> WorkspaceStatusUpdate {
        WorkspaceStatusUpdate {
            workspace_id: workspace_id.to_string(),
            status: self.status,
            services: self
                .services
                .iter()
                .map(|(name, service)| (name.clone(), service.status))
                .collect(),
            ports: self
                .services
                .iter()
                .filter_map(|(name, service)| Some((name.clone(), service.mapped_port?)))
                .collect(),
            message: match self.status {
                WorkspaceStatus::Error => self.error_message.clone(),
                _ => None,
            },
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Holds a workspace's `service_batch` flag. Dropping it, including when the
/// batch future is cancelled, clears the flag.
pub(crate) struct ServiceBatch {
    workspace: Arc<ManagedWorkspace>,
}

impl ServiceBatch {
    /// Caller holds `state`, the write guard of `workspace`.
    pub(crate) fn begin(workspace: &Arc<ManagedWorkspace>, state: &mut WorkspaceState) -> Self {
        state.service_batch = true;
        Self {
            workspace: Arc::clone(workspace),
        }
    }
}

impl Drop for ServiceBatch {
    fn drop(&mut self) {
        self.workspace.state.write().service_batch = false;
    }
}

pub(crate) struct ManagedService {
    pub(crate) definition: ServiceDefinition,
    pub(crate) mapped_port: Option<u16>,
    pub(crate) status: ServiceStatus,
    pub(crate) health: HealthStatus,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) last_check: Option<DateTime<Utc>>,
    pub(crate) error_message: Option<String>,
}

impl ManagedService {
    pub(crate) fn new(definition: ServiceDefinition) -> Self {
        Self {
            definition,
            mapped_port: None,
            status: ServiceStatus::Pending,
            health: HealthStatus::Unknown,
            started_at: None,
            last_check: None,
            error_message: None,
        }
    }

    /// Back to pending for a new start attempt, keeping the traffic port.
    pub(crate) fn reset(&mut self, definition: &ServiceDefinition) {
        self.definition = definition.clone();
        self.status = ServiceStatus::Pending;
        self.health = HealthStatus::Unknown;
        self.error_message = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = ServiceStatus::Error;
        self.error_message = Some(message.into());
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = ServiceStatus::Running;
        self.started_at = Some(Utc::now());
        self.error_message = None;
    }

    pub(crate) fn record_health(&mut self, outcome: &HealthOutcome) {
        self.last_check = Some(Utc::now());
        match outcome {
            HealthOutcome::Healthy => {
                self.health = HealthStatus::Healthy;
                self.status = ServiceStatus::Running;
                self.error_message = None;
            }
            HealthOutcome::Unhealthy(reason) => {
                self.health = HealthStatus::Unhealthy;
                self.status = ServiceStatus::Unhealthy;
                self.error_message = Some(reason.clone());
            }
        }
    }

    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.definition.name.clone(),
            status: self.status,
            health: self.health,
            port: self.definition.port,
            mapped_port: self.mapped_port,
            started_at: self.started_at,
            last_check: self.last_check,
            error: self.error_message.clone(),
        }
    }
}
