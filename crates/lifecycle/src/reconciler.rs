use std::collections::HashSet;

use time::OffsetDateTime;

use crate::manager::LifecycleManager;
use crate::tracking_store::TrackingStoreError;
use flowbridge_client_state::parse;
use flowbridge_common::{TrackingRecord, TrackingStatus};
use flowbridge_platform_client::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    TrackingStore(#[from] TrackingStoreError),
}

/// Outcome of one reconciler tick (§4.7 "Reconciler"), reported so the
/// manual-trigger endpoint and the timer task can both log something
/// meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileReport {
    pub renewed: Vec<String>,
    pub renewal_failures: Vec<String>,
    pub marked_deleted: Vec<String>,
    pub tracking_records_created: Vec<String>,
}

/// Renews near-expiry subscriptions and converges the tracking list to the
/// live subscription set. Runs on an hourly timer and on manual trigger
/// (§6.1 `/subscriptions/sync`); both paths call [`run`].
pub struct Reconciler<'a> {
    manager: &'a LifecycleManager,
    renewal_window: time::Duration,
}

impl<'a> Reconciler<'a> {
    pub fn new(manager: &'a LifecycleManager, renewal_window: time::Duration) -> Self {
        Self {
            manager,
            renewal_window,
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();
        let now = OffsetDateTime::now_utc();

        let live_subscriptions = self.manager.subscriptions().list().await?;
        let live_ids: HashSet<&str> = live_subscriptions.iter().map(|s| s.id.as_str()).collect();

        for subscription in &live_subscriptions {
            if subscription.is_within_renewal_window(self.renewal_window, now) {
                match self.manager.subscriptions().renew(&subscription.id).await {
                    Ok(renewed) => {
                        tracing::info!(subscription_id = %renewed.id, expires_at = %renewed.expires_at, "renewed subscription");
                        if let Some(mut tracked) = self.manager.tracking().get(&renewed.id)? {
                            tracked.expires_at = renewed.expires_at;
                            self.manager.tracking().upsert(&tracked)?;
                        }
                        report.renewed.push(renewed.id);
                    }
                    Err(error) => {
                        tracing::warn!(subscription_id = %subscription.id, %error, "subscription renewal failed, will retry next tick");
                        report.renewal_failures.push(subscription.id.clone());
                    }
                }
            }
        }

        let tracked_records = self.manager.tracking().list()?;
        for record in &tracked_records {
            if record.status == TrackingStatus::Active && !live_ids.contains(record.subscription_id.as_str()) {
                self.manager.tracking().mark_deleted(&record.subscription_id)?;
                report.marked_deleted.push(record.subscription_id.clone());
            }
        }

        let tracked_ids: HashSet<&str> = tracked_records
            .iter()
            .map(|record| record.subscription_id.as_str())
            .collect();
        for subscription in &live_subscriptions {
            if !tracked_ids.contains(subscription.id.as_str()) {
                let routing = parse(&subscription.client_state);
                let record = TrackingRecord {
                    subscription_id: subscription.id.clone(),
                    resource: subscription.resource.clone(),
                    client_state: subscription.client_state.clone(),
                    expires_at: subscription.expires_at,
                    description: format!("{} destination(s) configured", routing.destinations.len()),
                    notification_count: 0,
                    status: TrackingStatus::Active,
                };
                self.manager.tracking().upsert(&record)?;
                report.tracking_records_created.push(subscription.id.clone());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use flowbridge_common::{ChangeType, Resource, Subscription};
    use flowbridge_platform_client::SubscriptionApi;

    use super::*;
    use crate::tracking_store::TrackingStore;

    struct FakeSubscriptionApi {
        subscriptions: Mutex<Vec<Subscription>>,
    }

    #[async_trait]
    impl SubscriptionApi for FakeSubscriptionApi {
        async fn create(
            &self,
            _resource: &Resource,
            _change_type: ChangeType,
            _callback_url: &str,
            _client_state: &str,
        ) -> Result<Subscription, PlatformError> {
            unimplemented!()
        }

        async fn list(&self) -> Result<Vec<Subscription>, PlatformError> {
            Ok(self.subscriptions.lock().unwrap().clone())
        }

        async fn delete(&self, _subscription_id: &str) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn renew(&self, subscription_id: &str) -> Result<Subscription, PlatformError> {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            let subscription = subscriptions
                .iter_mut()
                .find(|s| s.id == subscription_id)
                .ok_or_else(|| PlatformError::SubscriptionNotFound(subscription_id.to_string()))?;
            subscription.expires_at = OffsetDateTime::now_utc() + time::Duration::hours(72);
            Ok(subscription.clone())
        }
    }

    fn subscription(id: &str, expires_in: time::Duration) -> Subscription {
        Subscription {
            id: id.to_string(),
            resource: Resource::from("sites/a/lists/b"),
            change_type: ChangeType::Updated,
            callback_url: "https://x/ingress".to_string(),
            client_state: "destination:uipath|handler:document".to_string(),
            expires_at: OffsetDateTime::now_utc() + expires_in,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn manager_with(api: FakeSubscriptionApi) -> LifecycleManager {
        LifecycleManager::new(Arc::new(api), TrackingStore::in_memory().unwrap())
    }

    #[tokio::test]
    async fn renews_subscriptions_within_the_window() {
        let manager = manager_with(FakeSubscriptionApi {
            subscriptions: Mutex::new(vec![subscription("sub-1", time::Duration::hours(1))]),
        });
        let reconciler = Reconciler::new(&manager, time::Duration::hours(24));
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.renewed, vec!["sub-1".to_string()]);
    }

    #[tokio::test]
    async fn does_not_renew_subscriptions_outside_the_window() {
        let manager = manager_with(FakeSubscriptionApi {
            subscriptions: Mutex::new(vec![subscription("sub-1", time::Duration::hours(48))]),
        });
        let reconciler = Reconciler::new(&manager, time::Duration::hours(24));
        let report = reconciler.run().await.unwrap();
        assert!(report.renewed.is_empty());
    }

    #[tokio::test]
    async fn creates_tracking_records_for_untracked_live_subscriptions() {
        let manager = manager_with(FakeSubscriptionApi {
            subscriptions: Mutex::new(vec![subscription("sub-1", time::Duration::hours(48))]),
        });
        let reconciler = Reconciler::new(&manager, time::Duration::hours(24));
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.tracking_records_created, vec!["sub-1".to_string()]);
        assert!(manager.tracking().get("sub-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn marks_orphaned_tracking_records_deleted() {
        let manager = manager_with(FakeSubscriptionApi {
            subscriptions: Mutex::new(Vec::new()),
        });
        manager
            .tracking()
            .upsert(&TrackingRecord {
                subscription_id: "sub-gone".to_string(),
                resource: Resource::from("sites/a/lists/b"),
                client_state: String::new(),
                expires_at: OffsetDateTime::now_utc(),
                description: "orphaned".to_string(),
                notification_count: 0,
                status: TrackingStatus::Active,
            })
            .unwrap();

        let reconciler = Reconciler::new(&manager, time::Duration::hours(24));
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.marked_deleted, vec!["sub-gone".to_string()]);
    }

    #[tokio::test]
    async fn renewal_never_produces_an_earlier_expiry() {
        let manager = manager_with(FakeSubscriptionApi {
            subscriptions: Mutex::new(vec![subscription("sub-1", time::Duration::hours(1))]),
        });
        let before = manager
            .subscriptions()
            .list()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == "sub-1")
            .unwrap()
            .expires_at;
        let reconciler = Reconciler::new(&manager, time::Duration::hours(24));
        reconciler.run().await.unwrap();
        let after = manager
            .subscriptions()
            .list()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == "sub-1")
            .unwrap()
            .expires_at;
        assert!(after >= before);
    }
}
