use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use nexus_orchestrator::{
    CreateWorkspaceRequest, OrchestratorError, WorkspaceCreateResult, WorkspaceInfo,
    WorkspaceStatusUpdate,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workspaces",
            get(list_workspaces).post(create_workspace),
        )
        .route(
            "/api/v1/workspaces/{id}",
            get(get_workspace).delete(delete_workspace),
        )
        .route("/api/v1/workspaces/{id}/details", get(describe_workspace))
        .route("/api/v1/workspaces/{id}/services/start", post(start_services))
        .route("/api/v1/workspaces/{id}/services/health", post(check_health))
        .route("/api/v1/workspaces/{id}/stop", post(stop_workspace))
}

/// 201 when the workspace came up, 500 with the same body when provisioning failed.
async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<(StatusCode, Json<WorkspaceCreateResult>)> {
    let result = state.orchestrator.create_workspace(req).await?;
    let status = if result.is_running() {
        StatusCode::CREATED
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(result)))
}

async fn list_workspaces(State(state): State<AppState>) -> Json<Vec<WorkspaceStatusUpdate>> {
    Json(state.orchestrator.list_workspaces())
}

async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceStatusUpdate>> {
    let status = state
        .orchestrator
        .get_workspace_status(&id)
        .ok_or(OrchestratorError::NotFound(id))?;
    Ok(Json(status))
}

async fn describe_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceInfo>> {
    let info = state
        .orchestrator
        .describe_workspace(&id)
        .ok_or(OrchestratorError::NotFound(id))?;
    Ok(Json(info))
}

async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.delete_workspace(&id).await?;

    Ok(Json(serde_json::json!({ "message": "Workspace deleted" })))
}

async fn start_services(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceStatusUpdate>> {
    let update = state.orchestrator.start_services(&id).await?;
    Ok(Json(update))
}

async fn check_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceStatusUpdate>> {
    let update = state.orchestrator.check_services_health(&id).await?;
    Ok(Json(update))
}

async fn stop_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkspaceStatusUpdate>> {
    let update = state.orchestrator.stop_workspace(&id).await?;
    Ok(Json(update))
}
