//! Execution backend abstraction.
//!
//! A [`Provider`] creates, starts, stops and destroys an isolated execution
//! context (a container or a VM) and runs commands inside it. Concrete
//! backends are selected by name through [`get_provider`] or a
//! [`ProviderRegistry`] built at startup.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod command;
pub mod error;
pub mod registry;

#[cfg(feature = "docker")]
pub mod docker;
#[cfg(feature = "podman")]
pub mod podman;
#[cfg(feature = "tart")]
pub mod tart;

// When the `test-helpers` feature is enabled, include the mock provider.
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use error::{ProviderError, Result};
pub use registry::{get_provider, ProviderRegistry};

/// Label attached to every execution context created on behalf of a workspace.
pub const WORKSPACE_LABEL: &str = "nexus.workspace";

/// Opaque handle to an execution context, as reported by its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Backend-specific unique identifier (container id, VM name).
    pub id: String,
    /// Human-readable name the backend knows the context by.
    pub name: String,
    /// Provider type (docker, podman, tart, ...)
    pub provider: String,
    /// Current status as reported by the backend.
    pub status: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Resource limits and wiring requested for a new execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHint {
    pub image: String,
    pub cpus: u32,
    /// Memory size such as `"2GB"`.
    pub memory: String,
    /// Disk size such as `"20GB"`.
    pub disk: String,
    /// Host port to map onto the context's port 22, when the backend supports it.
    pub shell_port: Option<u16>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A command to run inside an execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
}

impl ExecOptions {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// `/bin/bash -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(["/bin/bash".to_string(), "-c".to_string(), script.into()])
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn capture_output(mut self) -> Self {
        self.capture_stdout = true;
        self.capture_stderr = true;
        self
    }

    /// The command as a single display string, for logs and matching.
    pub fn command_line(&self) -> String {
        self.cmd.join(" ")
    }

    pub(crate) fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Output of a successful [`Provider::exec`]. Streams that were not requested
/// are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The contract every execution backend implements.
///
/// Every call may block on external I/O. Dropping the returned future cancels
/// the call; CLI backends kill their child process when that happens.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the name of the provider (e.g., "docker", "tart").
    fn name(&self) -> &'static str;

    /// Create (but do not start) the execution context for workspace `id`.
    async fn create(
        &self,
        id: &str,
        workspace_path: &Path,
        hint: &CreateHint,
    ) -> Result<ExecutionHandle>;

    async fn start(&self, id: &str) -> Result<()>;

    /// Stop a running context without destroying it.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Destroy the context, removing all associated resources.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Execute a command inside the context. A non-zero exit is an error.
    async fn exec(&self, id: &str, opts: &ExecOptions) -> Result<ExecOutput>;

    /// List every context this backend manages for nexus.
    async fn list(&self) -> Result<Vec<ExecutionHandle>>;
}

/// Name the backend uses for the context of workspace `id`.
pub fn context_name(id: &str) -> String {
    format!("nexus-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_exec_options() {
        let opts = ExecOptions::shell("echo hi");
        assert_eq!(opts.cmd, vec!["/bin/bash", "-c", "echo hi"]);
        assert!(!opts.capture_stdout);
        assert_eq!(opts.command_line(), "/bin/bash -c echo hi");
    }

    #[test]
    fn test_exec_options_env_and_capture() {
        let mut env = BTreeMap::new();
        env.insert("PORT".to_string(), "8080".to_string());
        let opts = ExecOptions::new(["env"]).with_env(env).capture_output();
        assert!(opts.capture_stdout && opts.capture_stderr);
        assert_eq!(
            opts.env_pairs(),
            vec![("PORT".to_string(), "8080".to_string())]
        );
    }

    #[test]
    fn test_context_name() {
        assert_eq!(context_name("ws-1"), "nexus-ws-1");
    }
}
