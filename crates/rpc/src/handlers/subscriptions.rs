use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use flowbridge_common::ChangeType;
use flowbridge_state_store::StateStore;
use serde::Deserialize;

use crate::error::RpcError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub resource: String,
    pub change_type: ChangeType,
    pub callback_url: String,
    #[serde(default)]
    pub client_state: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionIdQuery {
    pub id: String,
}

/// `GET /subscriptions`: every live subscription joined with its
/// tracking-list row (§4.7 "List").
pub async fn list<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<impl IntoResponse, RpcError> {
    let views = state.lifecycle.list().await?;
    Ok(Json(views))
}

/// `POST /subscriptions`: register a new subscription (§4.7 "Create").
/// Validation failures surface as 400 before the platform is ever called.
pub async fn create<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, RpcError> {
    let subscription = state
        .lifecycle
        .create(&request.resource, request.change_type, &request.callback_url, &request.client_state)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// `DELETE /subscriptions?id=...`: unregister a subscription (§4.7
/// "Delete"), marking its tracking record deleted rather than removing it.
pub async fn delete<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
    Query(query): Query<SubscriptionIdQuery>,
) -> Result<impl IntoResponse, RpcError> {
    state.lifecycle.delete(&query.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /subscriptions/sync`: manually trigger the renewal/tracking-list
/// reconciler (§4.7 "Reconciler") instead of waiting for its hourly timer.
pub async fn sync<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<impl IntoResponse, RpcError> {
    let reconciler = flowbridge_lifecycle::Reconciler::new(state.lifecycle.as_ref(), state.renewal_window);
    let report = reconciler.run().await.map_err(|error| match error {
        flowbridge_lifecycle::ReconcileError::Platform(platform) => {
            RpcError::Lifecycle(flowbridge_lifecycle::LifecycleError::Platform(platform))
        }
        flowbridge_lifecycle::ReconcileError::TrackingStore(store) => {
            RpcError::Lifecycle(flowbridge_lifecycle::LifecycleError::TrackingStore(store))
        }
    })?;
    Ok(Json(report))
}
