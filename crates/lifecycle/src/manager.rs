use std::sync::Arc;

use flowbridge_client_state::RoutingSpec;
use flowbridge_common::{ChangeType, Resource, Subscription, TrackingRecord, TrackingStatus};
use flowbridge_platform_client::{PlatformError, SubscriptionApi};

use crate::tracking_store::{TrackingStore, TrackingStoreError};
use crate::validation::{validate_create_request, CreateSubscriptionValidationError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] CreateSubscriptionValidationError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    TrackingStore(#[from] TrackingStoreError),
}

/// A subscription joined with its tracking-list row, for the `/subscriptions`
/// list view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriptionView {
    pub subscription: Subscription,
    pub tracking: Option<TrackingRecord>,
}

/// Create/list/delete against the platform's subscription API, keeping the
/// tracking list in sync on every write (§4.7).
pub struct LifecycleManager {
    subscriptions: Arc<dyn SubscriptionApi>,
    tracking: TrackingStore,
}

impl LifecycleManager {
    pub fn new(subscriptions: Arc<dyn SubscriptionApi>, tracking: TrackingStore) -> Self {
        Self {
            subscriptions,
            tracking,
        }
    }

    pub async fn create(
        &self,
        resource: &str,
        change_type: ChangeType,
        callback_url: &str,
        client_state: &str,
    ) -> Result<Subscription, LifecycleError> {
        validate_create_request(resource, callback_url, client_state)?;
        let resource = Resource::from(resource);
        let subscription = self
            .subscriptions
            .create(&resource, change_type, callback_url, client_state)
            .await?;

        let routing = flowbridge_client_state::parse(client_state);
        let record = TrackingRecord {
            subscription_id: subscription.id.clone(),
            resource: subscription.resource.clone(),
            client_state: subscription.client_state.clone(),
            expires_at: subscription.expires_at,
            description: describe_routing(&subscription.resource, &routing),
            notification_count: 0,
            status: TrackingStatus::Active,
        };
        self.tracking.upsert(&record)?;
        Ok(subscription)
    }

    pub async fn list(&self) -> Result<Vec<SubscriptionView>, LifecycleError> {
        let subscriptions = self.subscriptions.list().await?;
        let mut views = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let tracking = self.tracking.get(&subscription.id)?;
            views.push(SubscriptionView { subscription, tracking });
        }
        Ok(views)
    }

    pub async fn delete(&self, subscription_id: &str) -> Result<(), LifecycleError> {
        self.subscriptions.delete(subscription_id).await?;
        self.tracking.mark_deleted(subscription_id)?;
        Ok(())
    }

    /// Fire-and-forget counter bump for the ingress pipeline (§4.1 step 8).
    /// Failures are logged, never surfaced — the caller must not let a
    /// tracking-list hiccup affect notification dispatch.
    pub fn record_notification(&self, subscription_id: &str) {
        if let Err(error) = self.tracking.increment_notification_count(subscription_id) {
            tracing::warn!(subscription_id, %error, "failed to update tracking-list notification counter");
        }
    }

    pub(crate) fn subscriptions(&self) -> &Arc<dyn SubscriptionApi> {
        &self.subscriptions
    }

    pub(crate) fn tracking(&self) -> &TrackingStore {
        &self.tracking
    }
}

/// A short human-readable description of what a subscription routes to,
/// used to seed a tracking record's `description` column (§4.7 "Create").
fn describe_routing(resource: &Resource, routing: &RoutingSpec) -> String {
    if routing.destinations.is_empty() {
        return format!("No routing configured for {resource}");
    }
    let parts: Vec<String> = routing
        .destinations
        .iter()
        .map(|destination| match destination {
            flowbridge_client_state::Destination::Forward { url, .. } => format!("forward to {url}"),
            flowbridge_client_state::Destination::RpaQueue { handler_name, .. } => {
                format!("rpa queue via {handler_name}")
            }
            flowbridge_client_state::Destination::None => "no-op".to_string(),
        })
        .collect();
    format!("{resource}: {}", parts.join(", "))
}
