use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use flowbridge_common::{FieldMap, ItemId, Resource};
use flowbridge_state_store::StateStore;
use serde::Deserialize;

use crate::error::RpcError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct InitItem {
    pub item_id: String,
    pub fields: FieldMap,
}

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub resource: String,
    pub items: Vec<InitItem>,
}

/// `POST /states/init`: seeds the change-detection baseline for a resource
/// (§6.1) so the first real notification after a migration or backfill
/// doesn't register every field as newly added.
pub async fn init<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
    Json(request): Json<InitRequest>,
) -> Result<impl IntoResponse, RpcError> {
    if request.resource.trim().is_empty() {
        return Err(RpcError::BadRequest("resource must not be empty".to_string()));
    }
    let resource = Resource::from(request.resource);
    let fields_by_id = request
        .items
        .into_iter()
        .map(|item| (ItemId::from(item.item_id), item.fields))
        .collect();
    state.pipeline.state_store().batch_init(&resource, fields_by_id)?;
    Ok(StatusCode::NO_CONTENT)
}
