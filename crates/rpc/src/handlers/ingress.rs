use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use flowbridge_ingress::{handshake_response, NotificationBatch, NotificationOutcome};
use flowbridge_state_store::StateStore;
use serde::{Deserialize, Serialize};

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "validationToken")]
    pub(crate) validation_token: Option<String>,
}

/// `GET /ingress`: the platform's validation handshake (§4.1 "Handshake
/// mode", §8 invariant 1). Anonymous — there is nothing to authenticate
/// before the callback URL itself has been proven live.
pub async fn handshake(Query(query): Query<HandshakeQuery>) -> impl IntoResponse {
    match query.validation_token {
        Some(token) => (StatusCode::OK, [("content-type", "text/plain")], handshake_response(&token)).into_response(),
        None => (StatusCode::BAD_REQUEST, "missing validationToken").into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeSummary {
    Dropped { reason: String },
    Duplicate,
    Dispatched { destination_count: usize },
}

impl From<&NotificationOutcome> for OutcomeSummary {
    fn from(outcome: &NotificationOutcome) -> Self {
        match outcome {
            NotificationOutcome::Dropped { reason } => OutcomeSummary::Dropped { reason: reason.clone() },
            NotificationOutcome::Duplicate => OutcomeSummary::Duplicate,
            NotificationOutcome::Dispatched { destination_count } => OutcomeSummary::Dispatched {
                destination_count: *destination_count,
            },
        }
    }
}

/// `POST /ingress`: notification delivery (§4.1 "Notification mode").
/// Always 200 (§6.1, §7 "ingress always returns 200") — per-entry and
/// per-destination failures are isolated and only ever observed through
/// the response body and structured logs.
pub async fn notify<S: StateStore + Send + Sync + 'static>(
    State(state): State<SharedState<S>>,
    Json(batch): Json<NotificationBatch>,
) -> impl IntoResponse {
    let outcomes = state.pipeline.process_batch(batch).await;
    let summary: Vec<OutcomeSummary> = outcomes.iter().map(OutcomeSummary::from).collect();
    (StatusCode::OK, Json(summary))
}
