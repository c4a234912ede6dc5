use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use flowbridge_common::{ItemId, Resource};
use flowbridge_state_store::StateStore;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
struct HealthReport {
    state_store: bool,
    platform: bool,
}

impl HealthReport {
    fn is_healthy(&self) -> bool {
        self.state_store && self.platform
    }
}

/// `GET /health`: probes the two critical dependencies (the state store and
/// the collaboration platform's subscription API) and returns 503 if either
/// is unreachable (§6.1, §7 "503 from health when critical dependencies are
/// unreachable").
pub async fn health<S: StateStore + Send + Sync + 'static>(State(state): State<SharedState<S>>) -> impl IntoResponse {
    let probe_resource = Resource::from("__health__");
    let probe_item = ItemId::from("__health__");
    let state_store = state.pipeline.state_store().get(&probe_resource, &probe_item).is_ok();
    let platform = state.lifecycle.list().await.is_ok();

    let report = HealthReport { state_store, platform };
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
