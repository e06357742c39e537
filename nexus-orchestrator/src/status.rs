//! Lifecycle states and the result shapes handed back to callers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use nexus_provider::ExecutionHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Creating,
    Running,
    Stopped,
    Error,
    /// Transient while the execution context is being destroyed.
    Deleting,
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspaceStatus::Creating => "creating",
            WorkspaceStatus::Running => "running",
            WorkspaceStatus::Stopped => "stopped",
            WorkspaceStatus::Error => "error",
            WorkspaceStatus::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Starting,
    Running,
    Unhealthy,
    Stopped,
    Error,
}

impl ServiceStatus {
    /// Started and not since stopped or failed; eligible for health probes.
    pub fn is_live(self) -> bool {
        matches!(self, ServiceStatus::Running | ServiceStatus::Unhealthy)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Outcome of `create_workspace` when the request itself was acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceCreateResult {
    pub workspace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_handle: Option<ExecutionHandle>,
    pub status: WorkspaceStatus,
    /// Host port for remote-shell access. Absent when provisioning failed,
    /// since the port has been given back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkspaceCreateResult {
    pub fn is_running(&self) -> bool {
        self.status == WorkspaceStatus::Running
    }
}

/// Snapshot of a workspace and its services.
///
/// Returned by `start_services` (with `error` summarising failed services)
/// and by status queries (with `message` carrying the workspace error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceStatusUpdate {
    pub workspace_id: String,
    pub status: WorkspaceStatus,
    pub services: BTreeMap<String, ServiceStatus>,
    /// Host traffic port per started service.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Detailed per-service view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceStatus,
    pub health: HealthStatus,
    /// Port inside the execution context.
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detailed workspace view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub workspace_id: String,
    pub workspace_name: String,
    pub provider: String,
    pub status: WorkspaceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_handle: Option<ExecutionHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_port: Option<u16>,
    pub services: Vec<ServiceInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
