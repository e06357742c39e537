use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "ok",
        "service": "nexus-api",
        "version": env!("CARGO_PKG_VERSION"),
        "workspaces": orchestrator.workspace_count(),
        "providers": orchestrator.providers().names(),
        "allocated_ports": orchestrator.ports().allocated_count(),
    }))
}
