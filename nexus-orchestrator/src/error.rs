use std::fmt;
use std::future::Future;
use std::time::Duration;

use nexus_ports::PortError;
use nexus_provider::ProviderError;
use serde::Serialize;
use thiserror::Error;

use crate::deps::ResolveError;
use crate::request::ValidationError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Provider call that failed, carried by backend and timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Create,
    Start,
    Bootstrap,
    Exec,
    Stop,
    Destroy,
    List,
}

impl Stage {
    fn action(self) -> &'static str {
        match self {
            Stage::Create => "create execution context",
            Stage::Start => "start execution context",
            Stage::Bootstrap => "bootstrap remote shell",
            Stage::Exec => "execute command",
            Stage::Stop => "stop execution context",
            Stage::Destroy => "destroy execution context",
            Stage::List => "list execution contexts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(#[source] PortError),

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("Workspace already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Provider {0} not available")]
    ProviderUnavailable(String),

    #[error("Failed to {stage}: {source}")]
    Backend {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to {stage}: timed out after {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },

    #[error("Failed to resolve service order: {0}")]
    Cycle(#[from] ResolveError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A detached lifecycle task panicked or was cancelled by runtime shutdown.
    #[error("Operation aborted: {0}")]
    Aborted(String),
}

impl From<PortError> for OrchestratorError {
    fn from(err: PortError) -> Self {
        if err.is_exhausted() {
            OrchestratorError::ResourceExhausted(err)
        } else {
            OrchestratorError::Config(err.to_string())
        }
    }
}

impl OrchestratorError {
    /// The provider stage this error came from, for backend failures and timeouts.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OrchestratorError::Backend { stage, .. } | OrchestratorError::Timeout { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Run a provider call under a deadline, tagging any failure with `stage`.
pub(crate) async fn bounded<T, F>(stage: Stage, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = nexus_provider::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(OrchestratorError::Backend { stage, source }),
        Err(_) => Err(OrchestratorError::Timeout {
            stage,
            after: limit,
        }),
    }
}
