pub mod health;
pub mod workspaces;

use axum::Router;
use nexus_orchestrator::WorkspaceOrchestrator;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub fn create_app(orchestrator: WorkspaceOrchestrator) -> Router {
    let state = AppState::new(orchestrator);

    Router::new()
        .merge(health::routes())
        .merge(workspaces::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
