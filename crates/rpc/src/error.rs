use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowbridge_lifecycle::LifecycleError;
use flowbridge_state_store::StateStoreError;
use flowbridge_templates::UnknownHandlerError;

/// Everything a handler can fail with, mapped to the status codes §6.1
/// and §7 hand us: 400 for malformed requests, 401/403 for auth, 502 for
/// an upstream (platform or RPA provider) problem, 500 for anything local.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("missing or invalid function key")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
    #[error(transparent)]
    UnknownHandler(#[from] UnknownHandlerError),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcError::Unauthorized => StatusCode::UNAUTHORIZED,
            RpcError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::UnknownHandler(_) => StatusCode::BAD_REQUEST,
            RpcError::Lifecycle(LifecycleError::Validation(_)) => StatusCode::BAD_REQUEST,
            RpcError::Lifecycle(LifecycleError::Platform(_)) => StatusCode::BAD_GATEWAY,
            RpcError::Lifecycle(LifecycleError::TrackingStore(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            RpcError::StateStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
