//! Dependency ordering for service startup.

use std::collections::HashMap;

use thiserror::Error;

use crate::request::ServiceDefinition;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("circular dependency detected at service {0}")]
    Cycle(String),

    #[error("service {service} depends on undefined service {dependency}")]
    UnknownDependency { service: String, dependency: String },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Order `services` so each one comes after everything it depends on.
///
/// Depth-first with three marks. Services with no ordering constraint between
/// them keep their input order.
pub fn resolve_service_order(
    services: &[ServiceDefinition],
) -> Result<Vec<&ServiceDefinition>, ResolveError> {
    let index: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, service)| (service.name.as_str(), i))
        .collect();

    let mut marks = vec![Mark::Unvisited; services.len()];
    let mut order = Vec::with_capacity(services.len());
    for i in 0..services.len() {
        visit(i, services, &index, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    i: usize,
    services: &'a [ServiceDefinition],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    order: &mut Vec<&'a ServiceDefinition>,
) -> Result<(), ResolveError> {
    let service = &services[i];
    match marks[i] {
        Mark::Done => return Ok(()),
        Mark::InProgress => return Err(ResolveError::Cycle(service.name.clone())),
        Mark::Unvisited => {}
    }

    marks[i] = Mark::InProgress;
    for dependency in &service.depends_on {
        let &dep = index
            .get(dependency.as_str())
            .ok_or_else(|| ResolveError::UnknownDependency {
                service: service.name.clone(),
                dependency: dependency.clone(),
            })?;
        visit(dep, services, index, marks, order)?;
    }
    marks[i] = Mark::Done;
    order.push(service);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, deps: &[&str]) -> ServiceDefinition {
        ServiceDefinition::new(name, format!("run-{name}"), 8000).depends_on(deps.iter().copied())
    }

    fn names(order: Vec<&ServiceDefinition>) -> Vec<&str> {
        order.into_iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_chain_is_ordered() {
        let services = vec![svc("web", &["api"]), svc("api", &["db"]), svc("db", &[])];
        let order = resolve_service_order(&services).unwrap();
        assert_eq!(names(order), vec!["db", "api", "web"]);
    }

    #[test]
    fn test_independent_services_keep_input_order() {
        let services = vec![svc("c", &[]), svc("a", &[]), svc("b", &[])];
        assert_eq!(names(resolve_service_order(&services).unwrap()), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_diamond() {
        let services = vec![
            svc("web", &["api", "worker"]),
            svc("api", &["db"]),
            svc("worker", &["db", "cache"]),
            svc("db", &[]),
            svc("cache", &[]),
        ];
        let order = names(resolve_service_order(&services).unwrap());
        assert_eq!(order, vec!["db", "api", "cache", "worker", "web"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let services = vec![svc("a", &["b"]), svc("b", &["a"])];
        let err = resolve_service_order(&services).unwrap_err();
        assert_eq!(err, ResolveError::Cycle("a".to_string()));
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let services = vec![svc("a", &["a"])];
        assert_eq!(
            resolve_service_order(&services),
            Err(ResolveError::Cycle("a".to_string()))
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve_service_order(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_dependency() {
        let services = vec![svc("api", &["db"])];
        assert!(matches!(
            resolve_service_order(&services),
            Err(ResolveError::UnknownDependency { .. })
        ));
    }
}
