use nexus_orchestrator::OrchestratorConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Backends to register, in order. Missing tooling disables a backend.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_bind_addr() -> String {
    std::env::var("NEXUS_API_BIND").unwrap_or_else(|_| "0.0.0.0:3131".to_string())
}

fn default_providers() -> Vec<String> {
    std::env::var("NEXUS_PROVIDERS")
        .unwrap_or_else(|_| "docker,podman,tart".to_string())
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn default_health_interval() -> u64 {
    std::env::var("NEXUS_HEALTH_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30) // 30 seconds
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: default_bind_addr(),
            providers: default_providers(),
            health_interval_secs: default_health_interval(),
            orchestrator: OrchestratorConfig::from_env()?,
        })
    }
}
