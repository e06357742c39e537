//! Name -> provider lookup built once at startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ProviderError, Result};
use crate::Provider;

/// Creates a provider instance by backend name.
///
/// Returns [`ProviderError::DependencyNotFound`] when the backend's CLI is not
/// installed and [`ProviderError::UnknownProvider`] for names that are not
/// compiled in.
pub fn get_provider(name: &str) -> Result<Arc<dyn Provider>> {
    #[cfg(any(test, feature = "test-helpers"))]
    if name == "mock" {
        return Ok(Arc::new(crate::mock::MockProvider::new()));
    }

    match name {
        #[cfg(feature = "docker")]
        "docker" => Ok(Arc::new(crate::docker::DockerProvider::new()?)),
        #[cfg(feature = "podman")]
        "podman" => Ok(Arc::new(crate::podman::PodmanProvider::new()?)),
        #[cfg(feature = "tart")]
        "tart" => Ok(Arc::new(crate::tart::TartProvider::new()?)),
        _ => Err(ProviderError::UnknownProvider(name.to_string())),
    }
}

/// The set of backends a workspace request may select by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate every named backend. Backends whose tooling is missing are
    /// skipped with a warning; unknown names are an error.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match get_provider(name) {
                Ok(provider) => {
                    info!(provider = name, "registered provider");
                    registry.register_as(name, provider);
                }
                Err(ProviderError::DependencyNotFound(dep)) => {
                    warn!(provider = name, "{dep} is not installed, provider disabled");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(registry)
    }

    /// Register under the provider's own name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        let name = provider.name().to_string();
        self.providers.insert(name, provider);
        self
    }

    pub fn register_as(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn test_get_provider_mock() {
        let provider = get_provider("mock").expect("Should create mock provider");
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_get_provider_docker_or_missing_dependency() {
        match get_provider("docker") {
            Ok(provider) => assert_eq!(provider.name(), "docker"),
            Err(error) => assert!(error.to_string().contains("Dependency not found")),
        }
    }

    #[test]
    fn test_get_provider_unknown() {
        let result = get_provider("unknown-provider");
        let error = result.err().expect("unknown provider must fail");
        let message = error.to_string();
        assert!(message.contains("Unknown provider"));
        assert!(message.contains("unknown-provider"));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(MockProvider::new()))
            .register_as("docker", Arc::new(MockProvider::new()));

        assert_eq!(registry.names(), vec!["docker", "mock"]);
        assert!(registry.get("docker").is_some());
        assert!(registry.get("lxc").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        assert!(ProviderRegistry::from_names(["mock", "bogus"]).is_err());
        let registry = ProviderRegistry::from_names(["mock", " "]).unwrap();
        assert_eq!(registry.names(), vec!["mock"]);
    }
}
