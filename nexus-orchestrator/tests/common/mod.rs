//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nexus_orchestrator::{
    CreateWorkspaceRequest, OrchestratorConfig, RepositoryInfo, ResourceConfig,
    ServiceDefinition, SshConfig, WorkspaceOrchestrator,
};
use nexus_ports::PortRange;
use nexus_provider::mock::MockProvider;
use nexus_provider::ProviderRegistry;

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        shell_ports: PortRange::new(2222, 2231).unwrap(),
        service_ports: PortRange::new(23000, 23019).unwrap(),
        workspace_root: std::env::temp_dir().join("nexus-tests"),
        ..Default::default()
    }
}

/// Orchestrator with `mock` registered as provider "mock".
pub fn orchestrator_with(mock: &MockProvider, config: OrchestratorConfig) -> WorkspaceOrchestrator {
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(mock.clone()));
    WorkspaceOrchestrator::new(providers, config).expect("valid test config")
}

pub fn setup() -> (WorkspaceOrchestrator, MockProvider) {
    let mock = MockProvider::new();
    (orchestrator_with(&mock, config()), mock)
}

pub fn request(id: &str) -> CreateWorkspaceRequest {
    CreateWorkspaceRequest {
        workspace_id: id.to_string(),
        workspace_name: format!("{id} workspace"),
        provider: "mock".to_string(),
        image: "ubuntu:22.04".to_string(),
        repository: RepositoryInfo {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
            url: "https://github.com/acme/widgets.git".to_string(),
            branch: "main".to_string(),
        },
        services: Vec::new(),
        ssh: SshConfig {
            port: 22,
            user: "dev".to_string(),
            pub_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA dev@laptop".to_string(),
        },
        resources: ResourceConfig {
            cpu: 2,
            memory: "4GB".to_string(),
            disk: "20GB".to_string(),
        },
    }
}

pub fn request_with_services(id: &str, services: Vec<ServiceDefinition>) -> CreateWorkspaceRequest {
    CreateWorkspaceRequest {
        services,
        ..request(id)
    }
}

/// Service whose start command line contains `run-<name>`.
pub fn service(name: &str, port: u16, deps: &[&str]) -> ServiceDefinition {
    ServiceDefinition::new(name, format!("run-{name}"), port).depends_on(deps.iter().copied())
}
