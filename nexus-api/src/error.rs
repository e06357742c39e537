use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nexus_orchestrator::OrchestratorError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let message = err.to_string();
        match err {
            OrchestratorError::Validation(_) => ApiError::BadRequest(message),
            OrchestratorError::NotFound(_) => ApiError::NotFound(message),
            OrchestratorError::AlreadyExists(_) | OrchestratorError::InvalidState(_) => {
                ApiError::Conflict(message)
            }
            OrchestratorError::ResourceExhausted(_) => ApiError::Unavailable(message),
            OrchestratorError::Cycle(_) => ApiError::BadRequest(message),
            _ => ApiError::Internal(message),
        }
    }
}
