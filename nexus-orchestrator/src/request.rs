//! Workspace requests and their validation.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection of a malformed request. Always names the offending field or service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("service {service} depends on undefined service {dependency}")]
    UnknownDependency { service: String, dependency: String },
}

impl ValidationError {
    /// Field path (or service name) the error is about.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::InvalidField { field, .. } => field,
            ValidationError::DuplicateService(name) => name,
            ValidationError::UnknownDependency { service, .. } => service,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryInfo {
    pub owner: String,
    pub name: String,
    pub url: String,
    pub branch: String,
}

/// Remote-shell credentials installed into the execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Port the client expects to dial. The host port actually exposed is
    /// allocated by the orchestrator and reported in the create result.
    pub port: u16,
    pub user: String,
    pub pub_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub cpu: u32,
    /// e.g. `"4GB"`
    pub memory: String,
    /// e.g. `"20GB"`
    pub disk: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    #[default]
    Http,
    Tcp,
    Exec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSpec {
    #[serde(rename = "type")]
    pub kind: HealthCheckKind,
    /// HTTP path, `/health` when empty.
    pub path: String,
    /// Command for `exec` checks.
    pub command: String,
    /// Port to probe; the service's own port when zero.
    pub port: u16,
    /// Probe timeout in seconds; the configured default when absent.
    pub timeout: Option<u64>,
    /// Accepted for compatibility. Each invocation runs exactly one probe.
    pub retries: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefinition {
    pub name: String,
    pub command: String,
    /// Port the service listens on inside the execution context.
    pub port: u16,
    pub depends_on: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub health_check: Option<HealthCheckSpec>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            port,
            ..Default::default()
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_health_check(mut self, check: HealthCheckSpec) -> Self {
        self.health_check = Some(check);
        self
    }
}

/// Everything needed to provision one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateWorkspaceRequest {
    pub workspace_id: String,
    pub workspace_name: String,
    pub provider: String,
    pub image: String,
    pub repository: RepositoryInfo,
    pub services: Vec<ServiceDefinition>,
    pub ssh: SshConfig,
    pub resources: ResourceConfig,
}

fn require(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

fn require_non_zero<N: Default + PartialEq>(value: N, field: &str) -> Result<(), ValidationError> {
    if value == N::default() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

/// Identifiers end up in container names, paths and shell scripts.
fn check_identifier(value: &str, field: &str) -> Result<(), ValidationError> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !value.starts_with(|c: char| c == '-' || c == '.');
    if !valid {
        return Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: format!("{value:?} may only contain letters, digits, '-', '_' and '.'"),
        });
    }
    Ok(())
}

impl CreateWorkspaceRequest {
    /// Check every invariant, failing on the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.workspace_id, "workspace_id")?;
        check_identifier(&self.workspace_id, "workspace_id")?;
        require(&self.workspace_name, "workspace_name")?;
        require(&self.provider, "provider")?;
        require(&self.image, "image")?;

        require(&self.repository.owner, "repository.owner")?;
        require(&self.repository.name, "repository.name")?;
        require(&self.repository.url, "repository.url")?;
        require(&self.repository.branch, "repository.branch")?;

        require_non_zero(self.ssh.port, "ssh.port")?;
        require(&self.ssh.user, "ssh.user")?;
        check_identifier(&self.ssh.user, "ssh.user")?;
        require(&self.ssh.pub_key, "ssh.pub_key")?;
        if self.ssh.pub_key.contains('\n') {
            return Err(ValidationError::InvalidField {
                field: "ssh.pub_key".to_string(),
                reason: "must be a single line".to_string(),
            });
        }

        require_non_zero(self.resources.cpu, "resources.cpu")?;
        require(&self.resources.memory, "resources.memory")?;
        require(&self.resources.disk, "resources.disk")?;

        self.validate_services()
    }

    fn validate_services(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::with_capacity(self.services.len());
        for (index, service) in self.services.iter().enumerate() {
            require(&service.name, &format!("services[{index}].name"))?;
            if !names.insert(service.name.as_str()) {
                return Err(ValidationError::DuplicateService(service.name.clone()));
            }
            require(&service.command, &format!("services.{}.command", service.name))?;
            require_non_zero(service.port, &format!("services.{}.port", service.name))?;

            if let Some(check) = &service.health_check {
                if check.kind == HealthCheckKind::Exec {
                    require(
                        &check.command,
                        &format!("services.{}.health_check.command", service.name),
                    )?;
                }
            }
        }

        for service in &self.services {
            if let Some(dependency) = service
                .depends_on
                .iter()
                .find(|dep| !names.contains(dep.as_str()))
            {
                return Err(ValidationError::UnknownDependency {
                    service: service.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_request(id: &str) -> CreateWorkspaceRequest {
        CreateWorkspaceRequest {
            workspace_id: id.to_string(),
            workspace_name: format!("{id} workspace"),
            provider: "mock".to_string(),
            image: "ubuntu:22.04".to_string(),
            repository: RepositoryInfo {
                owner: "acme".to_string(),
                name: "widgets".to_string(),
                url: "https://github.com/acme/widgets.git".to_string(),
                branch: "feature/login".to_string(),
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

    fn missing(request: &CreateWorkspaceRequest) -> String {
        match request.validate() {
            Err(ValidationError::MissingField(field)) => field,
            other => panic!("expected a missing field, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request("ws-1").validate().is_ok());
    }

    fn assert_required(field: &str, clear: impl Fn(&mut CreateWorkspaceRequest)) {
        let mut request = valid_request("ws-1");
        clear(&mut request);
        assert_eq!(missing(&request), field);
    }

    #[test]
    fn test_each_required_field_is_named() {
        assert_required("workspace_id", |r| r.workspace_id.clear());
        assert_required("workspace_name", |r| r.workspace_name.clear());
        assert_required("provider", |r| r.provider.clear());
        assert_required("image", |r| r.image.clear());
        assert_required("repository.owner", |r| r.repository.owner.clear());
        assert_required("repository.name", |r| r.repository.name.clear());
        assert_required("repository.url", |r| r.repository.url.clear());
        assert_required("repository.branch", |r| r.repository.branch.clear());
        assert_required("ssh.port", |r| r.ssh.port = 0);
        assert_required("ssh.user", |r| r.ssh.user.clear());
        assert_required("ssh.pub_key", |r| r.ssh.pub_key.clear());
        assert_required("resources.cpu", |r| r.resources.cpu = 0);
        assert_required("resources.memory", |r| r.resources.memory.clear());
        assert_required("resources.disk", |r| r.resources.disk.clear());
    }

    #[test]
    fn test_duplicate_service_names_rejected() {
        let mut request = valid_request("ws-1");
        request.services = vec![
            ServiceDefinition::new("api", "npm start", 3000),
            ServiceDefinition::new("api", "npm run dev", 3001),
        ];
        assert_eq!(
            request.validate(),
            Err(ValidationError::DuplicateService("api".to_string()))
        );
    }

    #[test]
    fn test_undefined_dependency_rejected() {
        let mut request = valid_request("ws-1");
        request.services = vec![ServiceDefinition::new("api", "npm start", 3000).depends_on(["db"])];
        let err = request.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownDependency {
                service: "api".to_string(),
                dependency: "db".to_string(),
            }
        );
        assert_eq!(err.field(), "api");
    }

    #[test]
    fn test_self_dependency_passes_validation() {
        let mut request = valid_request("ws-1");
        request.services = vec![ServiceDefinition::new("api", "npm start", 3000).depends_on(["api"])];
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_service_fields_required() {
        let mut request = valid_request("ws-1");
        request.services = vec![ServiceDefinition::new("api", "", 3000)];
        assert_eq!(missing(&request), "services.api.command");

        request.services = vec![ServiceDefinition::new("api", "npm start", 0)];
        assert_eq!(missing(&request), "services.api.port");

        request.services = vec![ServiceDefinition::new("", "npm start", 3000)];
        assert_eq!(missing(&request), "services[0].name");
    }

    #[test]
    fn test_exec_health_check_needs_command() {
        let mut request = valid_request("ws-1");
        request.services = vec![ServiceDefinition::new("api", "npm start", 3000).with_health_check(
            HealthCheckSpec {
                kind: HealthCheckKind::Exec,
                ..Default::default()
            },
        )];
        assert_eq!(missing(&request), "services.api.health_check.command");
    }

    #[test]
    fn test_identifiers_are_shell_safe() {
        let mut request = valid_request("ws-1");
        request.ssh.user = "dev; rm -rf /".to_string();
        assert!(matches!(
            request.validate(),
            Err(ValidationError::InvalidField { ref field, .. }) if field == "ssh.user"
        ));

        let mut request = valid_request("../etc");
        assert!(request.validate().is_err());
        request.workspace_id = "feature_login.2".to_string();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_deserializes_with_missing_fields() {
        let request: CreateWorkspaceRequest = serde_json::from_str(
            r#"{"workspace_id":"ws-1","services":[{"name":"db","command":"pg","port":5432,
                "health_check":{"type":"tcp"}}]}"#,
        )
        .unwrap();
        assert_eq!(request.services[0].health_check.as_ref().unwrap().kind, HealthCheckKind::Tcp);
        assert_eq!(missing(&request), "workspace_name");
    }
}
