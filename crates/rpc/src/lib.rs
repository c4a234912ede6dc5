//! The HTTP surface (§6.1): the anonymous ingress callback and RPA
//! diagnostics endpoint, plus the function-key-gated subscription and
//! state-store management endpoints.

mod auth;
pub mod error;
mod handlers;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use flowbridge_state_store::StateStore;
use tower_http::trace::TraceLayer;

pub use error::RpcError;
pub use state::AppState;

/// Assembles the full router: anonymous routes served as-is, management
/// routes behind the function-key middleware (§6.1).
pub fn build_router<S: StateStore + Send + Sync + 'static>(state: AppState<S>) -> Router {
    let shared = Arc::new(state);

    let anonymous = Router::new()
        .route("/ingress", get(handlers::ingress::handshake).post(handlers::ingress::notify::<S>))
        .route("/rpa/test", get(handlers::rpa_test::ping).post(handlers::rpa_test::dry_run::<S>));

    let management = Router::new()
        .route(
            "/subscriptions",
            get(handlers::subscriptions::list::<S>)
                .post(handlers::subscriptions::create::<S>)
                .delete(handlers::subscriptions::delete::<S>),
        )
        .route("/subscriptions/sync", post(handlers::subscriptions::sync::<S>))
        .route("/states/init", post(handlers::states::init::<S>))
        .route("/health", get(handlers::health::health::<S>))
        .layer(axum::middleware::from_fn_with_state(shared.clone(), auth::require_function_key::<S>));

    anonymous
        .merge(management)
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::extract::{Query, State};
    use axum::response::IntoResponse;
    use axum::Json;
    use flowbridge_change_detector::ChangeDetector;
    use flowbridge_common::{ChangeType, FieldMap, Resource, Subscription};
    use flowbridge_forwarder::Forwarder;
    use flowbridge_ingress::{NotificationBatch, Pipeline};
    use flowbridge_lifecycle::{LifecycleManager, TrackingStore};
    use flowbridge_platform_client::{ItemReader, PlatformError, SubscriptionApi};
    use flowbridge_queue_client::{QueueClient, QueueClientError, QueueOutcome, QueueOverride};
    use flowbridge_retry::RetryPolicy;
    use flowbridge_state_store::SqliteStateStore;
    use flowbridge_templates::{DocumentProcessor, TemplateRegistry};
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::handlers::{health, ingress, rpa_test, states, subscriptions};

    struct NullItemReader;

    #[async_trait]
    impl ItemReader for NullItemReader {
        async fn get_item_fields(&self, _resource: &Resource, _item_id: &flowbridge_common::ItemId) -> Result<FieldMap, PlatformError> {
            Ok(FieldMap::new())
        }

        async fn most_recent_change(&self, _resource: &Resource) -> Result<Option<(flowbridge_common::ItemId, FieldMap)>, PlatformError> {
            Ok(None)
        }
    }

    struct NullQueueClient;

    #[async_trait]
    impl QueueClient for NullQueueClient {
        async fn submit(&self, _item: &flowbridge_common::QueueItem, _overrides: &QueueOverride) -> Result<QueueOutcome, QueueClientError> {
            Ok(QueueOutcome::Success { item_id: "1".to_string() })
        }
    }

    struct FakeSubscriptionApi {
        subscriptions: Mutex<Vec<Subscription>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SubscriptionApi for FakeSubscriptionApi {
        async fn create(
            &self,
            resource: &Resource,
            change_type: ChangeType,
            callback_url: &str,
            client_state: &str,
        ) -> Result<Subscription, PlatformError> {
            let subscription = Subscription {
                id: format!("sub-{}", self.subscriptions.lock().unwrap().len() + 1),
                resource: resource.clone(),
                change_type,
                callback_url: callback_url.to_string(),
                client_state: client_state.to_string(),
                expires_at: OffsetDateTime::now_utc() + time::Duration::hours(72),
                created_at: OffsetDateTime::now_utc(),
            };
            self.subscriptions.lock().unwrap().push(subscription.clone());
            Ok(subscription)
        }

        async fn list(&self) -> Result<Vec<Subscription>, PlatformError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PlatformError::Http { status: 503, body: "down".to_string() });
            }
            Ok(self.subscriptions.lock().unwrap().clone())
        }

        async fn delete(&self, subscription_id: &str) -> Result<(), PlatformError> {
            self.subscriptions.lock().unwrap().retain(|s| s.id != subscription_id);
            Ok(())
        }

        async fn renew(&self, _subscription_id: &str) -> Result<Subscription, PlatformError> {
            unimplemented!()
        }
    }

    fn test_state(fail_platform: bool) -> Arc<AppState<SqliteStateStore>> {
        let registry = Arc::new(TemplateRegistry::new());
        registry.register("document", Arc::new(DocumentProcessor));
        let forwarder = Arc::new(Forwarder::new(
            reqwest::Client::new(),
            RetryPolicy::new(1, Duration::from_millis(1)),
            "https://callback.example",
        ));
        let pipeline = Pipeline::new(
            Arc::new(NullItemReader),
            ChangeDetector::new(SqliteStateStore::in_memory().unwrap()),
            registry.clone(),
            Arc::new(NullQueueClient),
            forwarder,
            None,
            Duration::from_secs(60),
            10,
            "flowbridge",
        );
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::new(FakeSubscriptionApi {
                subscriptions: Mutex::new(Vec::new()),
                fail: AtomicBool::new(fail_platform),
            }),
            TrackingStore::in_memory().unwrap(),
        ));
        Arc::new(AppState {
            pipeline,
            lifecycle,
            registry,
            renewal_window: time::Duration::hours(24),
            function_key: Some("secret".to_string()),
        })
    }

    #[tokio::test]
    async fn handshake_echoes_token() {
        let response = ingress::handshake(Query(ingress::HandshakeQuery { validation_token: Some("tok".to_string()) }))
            .await
            .into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn handshake_without_token_is_bad_request() {
        let response = ingress::handshake(Query(ingress::HandshakeQuery { validation_token: None })).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn notify_always_returns_200_even_with_a_malformed_entry() {
        let state = test_state(false);
        let response = ingress::notify(State(state), Json(NotificationBatch { value: vec![json!({"bad": true})] }))
            .await
            .into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_list_round_trips_a_subscription() {
        let state = test_state(false);
        let created = subscriptions::create(
            State(state.clone()),
            Json(subscriptions::CreateSubscriptionRequest {
                resource: "sites/a/lists/b".to_string(),
                change_type: ChangeType::Updated,
                callback_url: "https://x/ingress".to_string(),
                client_state: "destination:uipath|handler:document".to_string(),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(created.status(), axum::http::StatusCode::CREATED);

        let listed = subscriptions::list(State(state)).await.unwrap().into_response();
        assert_eq!(listed.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn create_rejects_invalid_resource() {
        let state = test_state(false);
        let result = subscriptions::create(
            State(state),
            Json(subscriptions::CreateSubscriptionRequest {
                resource: "/bad".to_string(),
                change_type: ChangeType::Updated,
                callback_url: "https://x/ingress".to_string(),
                client_state: String::new(),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_unknown_subscription_still_succeeds() {
        let state = test_state(false);
        let response = subscriptions::delete(State(state), Query(subscriptions::SubscriptionIdQuery { id: "missing".to_string() }))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn states_init_seeds_the_baseline() {
        let state = test_state(false);
        states::init(
            State(state.clone()),
            Json(states::InitRequest {
                resource: "sites/a/lists/b".to_string(),
                items: vec![states::InitItem {
                    item_id: "1".to_string(),
                    fields: FieldMap::from([("Status".to_string(), json!("Draft"))]),
                }],
            }),
        )
        .await
        .unwrap();

        let stored = state
            .pipeline
            .state_store()
            .get(&Resource::from("sites/a/lists/b"), &flowbridge_common::ItemId::from("1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields.get("Status"), Some(&json!("Draft")));
    }

    #[tokio::test]
    async fn states_init_rejects_empty_resource() {
        let state = test_state(false);
        let result = states::init(
            State(state),
            Json(states::InitRequest {
                resource: String::new(),
                items: vec![],
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn health_is_ok_when_dependencies_are_reachable() {
        let state = test_state(false);
        let response = health::health(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_unavailable_when_the_platform_is_down() {
        let state = test_state(true);
        let response = health::health(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn rpa_test_dry_run_reports_whether_the_handler_would_process() {
        let state = test_state(false);
        let report = rpa_test::dry_run(
            State(state),
            Json(rpa_test::DryRunRequest {
                handler: "document".to_string(),
                current: FieldMap::from([("filename".to_string(), json!("a.pdf"))]),
                previous: None,
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(report.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn rpa_test_dry_run_rejects_unknown_handler() {
        let state = test_state(false);
        let result = rpa_test::dry_run(
            State(state),
            Json(rpa_test::DryRunRequest {
                handler: "missing".to_string(),
                current: FieldMap::new(),
                previous: None,
            }),
        )
        .await;
        assert!(result.is_err());
    }
}
