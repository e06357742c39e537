use anyhow::Result;
use nexus_api::{create_app, start_health_monitor_task, Config};
use nexus_orchestrator::WorkspaceOrchestrator;
use nexus_provider::ProviderRegistry;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = nexus_logging::init_subscriber();

    info!("Starting nexus-api service...");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: bind_addr={}, shell_ports={}, service_ports={}",
        config.bind_addr, config.orchestrator.shell_ports, config.orchestrator.service_ports
    );

    let providers = ProviderRegistry::from_names(&config.providers)?;
    if providers.is_empty() {
        warn!("No providers available; every workspace creation will fail");
    } else {
        info!("Providers: {}", providers.names().join(", "));
    }

    let orchestrator = WorkspaceOrchestrator::new(providers, config.orchestrator.clone())?;

    tokio::spawn(start_health_monitor_task(
        orchestrator.clone(),
        config.health_interval_secs,
    ));
    info!(
        "Health monitor started (interval: {}s)",
        config.health_interval_secs
    );

    let app = create_app(orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
