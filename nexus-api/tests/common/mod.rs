//! Common test utilities and helpers for nexus-api tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use nexus_orchestrator::{
    CreateWorkspaceRequest, OrchestratorConfig, RepositoryInfo, ResourceConfig, RetryPolicy,
    ServiceDefinition, SshConfig, WorkspaceOrchestrator,
};
use nexus_provider::mock::MockProvider;
use nexus_provider::ProviderRegistry;
use tower::ServiceExt; // for `oneshot`

/// Orchestrator backed by a fresh mock provider registered as "mock".
pub fn create_test_orchestrator() -> (WorkspaceOrchestrator, MockProvider) {
    let mock = MockProvider::new();
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(mock.clone()));
    let config = OrchestratorConfig {
        workspace_root: std::env::temp_dir().join("nexus-api-tests"),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 5,
        },
        ..Default::default()
    };
    let orchestrator =
        WorkspaceOrchestrator::new(providers, config).expect("Failed to create orchestrator");
    (orchestrator, mock)
}

/// Create a test workspace request with default values
pub fn create_test_workspace_request(id: &str) -> CreateWorkspaceRequest {
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
        services: vec![
            ServiceDefinition::new("db", "postgres -D /var/lib/pg", 5432),
            ServiceDefinition::new("api", "npm start", 3000).depends_on(["db"]),
        ],
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

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: axum::response::Response) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
    pub orchestrator: WorkspaceOrchestrator,
    pub mock: MockProvider,
}

impl TestClient {
    pub fn new() -> Self {
        let (orchestrator, mock) = create_test_orchestrator();
        let app = nexus_api::create_app(orchestrator.clone());
        Self {
            app,
            orchestrator,
            mock,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> axum::response::Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn create_workspace(&self, id: &str) -> StatusCode {
        let body = serde_json::to_value(create_test_workspace_request(id)).unwrap();
        self.request("POST", "/api/v1/workspaces", Some(body))
            .await
            .status()
    }
}
