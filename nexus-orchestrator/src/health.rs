//! Service health probes run inside the execution context.

use std::time::Duration;

use nexus_provider::{ExecOptions, Provider};
use tracing::debug;

use crate::request::{HealthCheckKind, ServiceDefinition};

const DEFAULT_HTTP_PATH: &str = "/health";

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    Unhealthy(String),
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }
}

/// A single probe, built from a service's health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthProbe {
    pub kind: HealthCheckKind,
    pub script: String,
    pub timeout: Duration,
}

impl HealthProbe {
    /// `None` when the service has no health check configured.
    pub fn for_service(service: &ServiceDefinition, default_timeout: Duration) -> Option<Self> {
        let check = service.health_check.as_ref()?;
        let port = if check.port != 0 {
            check.port
        } else {
            service.port
        };

        let script = match check.kind {
            HealthCheckKind::Http => {
                let path = match check.path.trim() {
                    "" => DEFAULT_HTTP_PATH.to_string(),
                    path if path.starts_with('/') => path.to_string(),
                    path => format!("/{path}"),
                };
                format!("curl -sf http://localhost:{port}{path}")
            }
            HealthCheckKind::Tcp => format!("nc -z localhost {port}"),
            HealthCheckKind::Exec => check.command.clone(),
        };

        let timeout = check
            .timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        Some(Self {
            kind: check.kind,
            script,
            timeout,
        })
    }

    /// Run the probe once. Errors and timeouts both count as unhealthy.
    pub async fn run(&self, provider: &dyn Provider, workspace_id: &str) -> HealthOutcome {
        let opts = ExecOptions::shell(self.script.clone());
        match tokio::time::timeout(self.timeout, provider.exec(workspace_id, &opts)).await {
            Ok(Ok(_)) => HealthOutcome::Healthy,
            Ok(Err(e)) => {
                debug!(workspace_id, probe = %self.script, error = %e, "health probe failed");
                HealthOutcome::Unhealthy(e.to_string())
            }
            Err(_) => HealthOutcome::Unhealthy(format!(
                "health check timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}
