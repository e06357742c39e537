use std::path::PathBuf;
use std::time::Duration;

use nexus_ports::PortRange;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Host ports handed out for remote-shell access, one per workspace.
    pub shell_ports: PortRange,
    /// Host ports handed out to started services.
    pub service_ports: PortRange,
    /// Each workspace's files live under `<workspace_root>/<workspace_id>`.
    pub workspace_root: PathBuf,

    /// Bound on each of the create and start provider calls.
    pub provision_timeout_secs: u64,
    pub bootstrap_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub destroy_timeout_secs: u64,
    /// Bound on a single attempt at a service start command.
    pub service_start_timeout_secs: u64,

    pub retry: RetryPolicy,

    /// Wait between a service starting and its first health probe.
    pub health_settle_ms: u64,
    pub default_health_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            shell_ports: PortRange {
                start: 2222,
                end: 2299,
            },
            service_ports: PortRange {
                start: 23000,
                end: 30000,
            },
            workspace_root: PathBuf::from("/var/lib/nexus/workspaces"),
            provision_timeout_secs: 30,
            bootstrap_timeout_secs: 300,
            stop_timeout_secs: 15,
            destroy_timeout_secs: 30,
            service_start_timeout_secs: 60,
            retry: RetryPolicy::default(),
            health_settle_ms: 2000,
            default_health_timeout_secs: 10,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| OrchestratorError::Config(format!("{name}={value:?}: {e}")))
}

impl OrchestratorConfig {
    /// Defaults overridden by `NEXUS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = env_var("NEXUS_SHELL_PORTS") {
            config.shell_ports = parse_env("NEXUS_SHELL_PORTS", &value)?;
        }
        if let Some(value) = env_var("NEXUS_SERVICE_PORTS") {
            config.service_ports = parse_env("NEXUS_SERVICE_PORTS", &value)?;
        }
        if let Some(value) = env_var("NEXUS_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(value);
        }
        if let Some(value) = env_var("NEXUS_START_ATTEMPTS") {
            config.retry.max_attempts = parse_env("NEXUS_START_ATTEMPTS", &value)?;
        }
        if let Some(value) = env_var("NEXUS_HEALTH_SETTLE_MS") {
            config.health_settle_ms = parse_env("NEXUS_HEALTH_SETTLE_MS", &value)?;
        }

        Ok(config)
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_secs)
    }

    pub fn service_start_timeout(&self) -> Duration {
        Duration::from_secs(self.service_start_timeout_secs)
    }

    pub fn health_settle_delay(&self) -> Duration {
        Duration::from_millis(self.health_settle_ms)
    }

    pub fn default_health_timeout(&self) -> Duration {
        Duration::from_secs(self.default_health_timeout_secs)
    }
}
