use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use flowbridge_state_store::StateStore;

use crate::error::RpcError;
use crate::state::SharedState;

const FUNCTION_KEY_HEADER: &str = "x-functions-key";

/// Whether `provided` satisfies `configured`. A `None` configured key means
/// the check is disabled; a `None` provided header never satisfies a
/// configured key.
fn function_key_is_valid(configured: Option<&str>, provided: Option<&str>) -> bool {
    match configured {
        None => true,
        Some(expected) => provided == Some(expected),
    }
}

/// Rejects management-endpoint requests that don't carry the configured
/// function key (§6.1 "function-key" auth), before the handler ever runs.
pub async fn require_function_key<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, RpcError> {
    let provided = headers
        .get(FUNCTION_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if function_key_is_valid(state.function_key.as_deref(), provided) {
        Ok(next.run(request).await)
    } else {
        Err(RpcError::Unauthorized)
    }
}
