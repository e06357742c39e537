//! Workspace orchestration engine
//!
//! Turns a [`CreateWorkspaceRequest`] into a running execution context with a
//! remote shell, starts its services in dependency order with retries, and
//! keeps per-service health up to date. Consumed by the nexus-api HTTP
//! service; the engine itself exposes no network protocol.

pub mod bootstrap;
pub mod config;
pub mod deps;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod request;
pub mod retry;
pub mod services;
mod state;
pub mod status;

pub use config::OrchestratorConfig;
pub use deps::{resolve_service_order, ResolveError};
pub use error::{OrchestratorError, Result, Stage};
pub use health::{HealthOutcome, HealthProbe};
pub use orchestrator::WorkspaceOrchestrator;
pub use request::{
    CreateWorkspaceRequest, HealthCheckKind, HealthCheckSpec, RepositoryInfo, ResourceConfig,
    ServiceDefinition, SshConfig, ValidationError,
};
pub use retry::{backoff_delay, RetryPolicy};
pub use status::{
    HealthStatus, ServiceInfo, ServiceStatus, WorkspaceCreateResult, WorkspaceInfo,
    WorkspaceStatus, WorkspaceStatusUpdate,
};
