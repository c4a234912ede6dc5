//! Wires the ingress procedure together (§4.1 "Notification mode"): parse,
//! dedup, route, enrich, bounded fan-out dispatch, fire-and-forget tracking
//! update.

use std::sync::Arc;

use flowbridge_change_detector::{ChangeDetector, FieldFilter};
use flowbridge_client_state::{Destination, ForwardMode, RoutingSpec};
use flowbridge_common::fields::apply_field_filters;
use flowbridge_common::time_util::{self, normalize_timestamp_str};
use flowbridge_common::{Diff, FieldMap, ItemId, Notification, Resource};
use flowbridge_forwarder::{Envelope, Forwarder};
use flowbridge_lifecycle::LifecycleManager;
use flowbridge_platform_client::ItemReader;
use flowbridge_queue_client::{QueueClient, QueueOverride};
use flowbridge_state_store::StateStore;
use flowbridge_templates::{ProcessOutcome, TemplateRegistry};
use tokio::sync::Semaphore;

use crate::dedup::{DedupCache, DedupKey};

/// Raw inbound request body for notification mode: `{"value": [...]}`.
/// Entries stay as [`serde_json::Value`] so one malformed entry can be
/// dropped without failing the rest of the batch (§4.1 step 1).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationBatch {
    pub value: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub enum DestinationOutcome {
    Forwarded,
    ForwardFailed(String),
    Queued(ProcessOutcome),
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub enum NotificationOutcome {
    Dropped { reason: String },
    Duplicate,
    /// Dispatch jobs have been spawned, not completed (§4.1 step 7:
    /// "Return 200 after all dispatch tasks have been *initiated*").
    /// `destination_count` is known synchronously from the routing spec;
    /// the per-destination results are only ever observed through logs.
    Dispatched { destination_count: usize },
}

enum DispatchJob {
    Forward {
        url: String,
        mode: ForwardMode,
        notification: Notification,
        current: Option<FieldMap>,
        previous: Option<FieldMap>,
        diff: Option<Diff>,
    },
    RpaQueue {
        handler_name: String,
        overrides: QueueOverride,
        current: FieldMap,
        previous: Option<FieldMap>,
    },
    Skipped {
        reason: String,
    },
}

struct Inner<S: StateStore> {
    item_reader: Arc<dyn ItemReader>,
    detector: ChangeDetector<S>,
    registry: Arc<TemplateRegistry>,
    queue: Arc<dyn QueueClient>,
    forwarder: Arc<Forwarder>,
    lifecycle: Option<Arc<LifecycleManager>>,
    dedup: DedupCache,
    fan_out: Semaphore,
    source: String,
}

/// The assembled ingress pipeline, generic over the concrete state store the
/// same way [`ChangeDetector`] is. Cheap to clone: every field is shared via
/// `Arc` (or, for the dedup cache and semaphore, internally synchronized).
pub struct Pipeline<S: StateStore>(Arc<Inner<S>>);

impl<S: StateStore> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: StateStore + Send + Sync + 'static> Pipeline<S> {
    /// The state store backing this pipeline's change detector, for the
    /// baseline-seeding endpoint (`POST /states/init`).
    pub fn state_store(&self) -> &S {
        self.0.detector.store()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        item_reader: Arc<dyn ItemReader>,
        detector: ChangeDetector<S>,
        registry: Arc<TemplateRegistry>,
        queue: Arc<dyn QueueClient>,
        forwarder: Arc<Forwarder>,
        lifecycle: Option<Arc<LifecycleManager>>,
        dedup_ttl: std::time::Duration,
        fan_out_cap: usize,
        source: impl Into<String>,
    ) -> Self {
        Self(Arc::new(Inner {
            item_reader,
            detector,
            registry,
            queue,
            forwarder,
            lifecycle,
            dedup: DedupCache::new(dedup_ttl),
            fan_out: Semaphore::new(fan_out_cap.max(1)),
            source: source.into(),
        }))
    }

    /// Runs the full notification-mode procedure over every entry in
    /// `batch`, returning one outcome per entry in the same order. Always
    /// succeeds at the batch level — a single bad entry never aborts the
    /// rest (§4.1 step 1, "Failure modes").
    pub async fn process_batch(&self, batch: NotificationBatch) -> Vec<NotificationOutcome> {
        let mut outcomes = Vec::with_capacity(batch.value.len());
        for raw in batch.value {
            outcomes.push(self.process_one(raw).await);
        }
        outcomes
    }

    async fn process_one(&self, raw: serde_json::Value) -> NotificationOutcome {
        let notification: Notification = match serde_json::from_value(raw) {
            Ok(notification) => notification,
            Err(error) => {
                return NotificationOutcome::Dropped {
                    reason: error.to_string(),
                }
            }
        };

        let bucket = bucket_timestamp(notification.change_timestamp.as_deref());
        if !self
            .0
            .dedup
            .observe(DedupKey::new(notification.subscription_id.clone(), bucket))
        {
            return NotificationOutcome::Duplicate;
        }

        let routing = flowbridge_client_state::parse(notification.client_state.as_deref().unwrap_or(""));
        let resource = notification.resource.clone();

        let current = if routing.requires_item_data() {
            self.fetch_item_data(&resource, &notification).await
        } else {
            None
        };

        let (previous, diff) = self.detect_changes(&routing, &resource, &notification, current.as_ref());

        let jobs = build_jobs(&routing, &notification, current.as_ref(), previous.as_ref(), diff.as_ref());
        let destination_count = jobs.len();
        self.spawn_dispatch(jobs);

        if let Some(lifecycle) = &self.0.lifecycle {
            lifecycle.record_notification(&notification.subscription_id);
        }

        NotificationOutcome::Dispatched { destination_count }
    }

    /// Initiates dispatch for every job without waiting for any of them to
    /// finish: the `JoinSet` is driven to completion on a detached task, so
    /// the invocation that produced these jobs can return its 200 as soon
    /// as the jobs exist, not after every destination's retries have run
    /// (§4.1 step 7, §5 "invocation-scoped" cancellation boundary).
    fn spawn_dispatch(&self, jobs: Vec<DispatchJob>) {
        if jobs.is_empty() {
            return;
        }
        let pipeline = self.clone();
        tokio::spawn(async move {
            let outcomes = pipeline.dispatch_all(jobs).await;
            for outcome in &outcomes {
                tracing::debug!(?outcome, "destination dispatch completed");
            }
        });
    }

    async fn fetch_item_data(&self, resource: &Resource, notification: &Notification) -> Option<FieldMap> {
        if let Some(id) = notification.item_id() {
            return match self.0.item_reader.get_item_fields(resource, &ItemId::from(id)).await {
                Ok(fields) => Some(fields),
                Err(error) => {
                    tracing::warn!(%error, resource = resource.as_str(), item_id = id, "failed to fetch item data");
                    None
                }
            };
        }

        match self.0.item_reader.most_recent_change(resource).await {
            Ok(Some((_, fields))) => Some(fields),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(%error, resource = resource.as_str(), "most-recent-change fallback failed");
                None
            }
        }
    }

    /// Runs change detection when either an explicit `forward` destination
    /// asked for it, or an `rpaQueue` destination is present — a processor
    /// can only honor the "compare current to previous" rule (§5) if it is
    /// actually given a previous snapshot.
    fn detect_changes(
        &self,
        routing: &RoutingSpec,
        resource: &Resource,
        notification: &Notification,
        current: Option<&FieldMap>,
    ) -> (Option<FieldMap>, Option<Diff>) {
        let Some(current) = current else {
            return (None, None);
        };
        let needs_previous = routing.any_change_detection_enabled()
            || routing
                .destinations
                .iter()
                .any(|destination| matches!(destination, Destination::RpaQueue { .. }));
        if !needs_previous {
            return (None, None);
        }
        let Some(id) = notification.item_id() else {
            return (None, None);
        };
        let item_id = ItemId::from(id);

        let previous = self
            .0
            .detector
            .store()
            .get(resource, &item_id)
            .ok()
            .flatten()
            .map(|snapshot| snapshot.fields);

        let diff = match self
            .0
            .detector
            .detect(resource, &item_id, current, &FieldFilter::default())
        {
            Ok(diff) => Some(diff),
            Err(error) => {
                tracing::warn!(%error, resource = resource.as_str(), item_id = id, "change detection failed");
                None
            }
        };

        (previous, diff)
    }

    async fn dispatch_all(&self, jobs: Vec<DispatchJob>) -> Vec<DestinationOutcome> {
        let mut set = tokio::task::JoinSet::new();
        for job in jobs {
            let pipeline = self.clone();
            set.spawn(async move { pipeline.dispatch_one(job).await });
        }

        let mut outcomes = Vec::with_capacity(set.len());
        while let Some(result) = set.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    tracing::warn!(%error, "destination dispatch task panicked");
                    outcomes.push(DestinationOutcome::Skipped {
                        reason: "dispatch task panicked".to_string(),
                    });
                }
            }
        }
        outcomes
    }

    async fn dispatch_one(&self, job: DispatchJob) -> DestinationOutcome {
        let _permit = self.0.fan_out.acquire().await.expect("fan-out semaphore is never closed");
        match job {
            DispatchJob::Skipped { reason } => DestinationOutcome::Skipped { reason },
            DispatchJob::Forward {
                url,
                mode,
                notification,
                current,
                previous,
                diff,
            } => {
                let envelope = Envelope::build(mode, self.0.source.clone(), notification, current, previous, diff.as_ref());
                match self.0.forwarder.forward(&url, &envelope).await {
                    Ok(()) => DestinationOutcome::Forwarded,
                    Err(error) => {
                        tracing::warn!(%error, url, "forward dispatch failed");
                        DestinationOutcome::ForwardFailed(error.to_string())
                    }
                }
            }
            DispatchJob::RpaQueue {
                handler_name,
                overrides,
                current,
                previous,
            } => match self.0.registry.resolve(&handler_name) {
                Ok(processor) => {
                    let outcome = processor
                        .process(&current, previous.as_ref(), self.0.queue.as_ref(), &overrides)
                        .await;
                    DestinationOutcome::Queued(outcome)
                }
                Err(error) => {
                    tracing::warn!(%error, handler_name, "unknown template handler");
                    DestinationOutcome::Queued(ProcessOutcome::SubmissionError(error.to_string()))
                }
            },
        }
    }
}

fn build_jobs(
    routing: &RoutingSpec,
    notification: &Notification,
    current: Option<&FieldMap>,
    previous: Option<&FieldMap>,
    diff: Option<&Diff>,
) -> Vec<DispatchJob> {
    let mut jobs = Vec::with_capacity(routing.destinations.len());
    for destination in &routing.destinations {
        match destination {
            Destination::None => {}
            Destination::Forward {
                url,
                mode,
                include_fields,
                exclude_fields,
                change_detection_enabled,
            } => {
                if destination.requires_item_data() && current.is_none() {
                    jobs.push(DispatchJob::Skipped {
                        reason: "item data unavailable".to_string(),
                    });
                    continue;
                }
                let filtered_current =
                    current.map(|fields| apply_field_filters(fields, include_fields.as_deref(), exclude_fields.as_deref()));
                let filtered_previous = if *change_detection_enabled {
                    previous.map(|fields| apply_field_filters(fields, include_fields.as_deref(), exclude_fields.as_deref()))
                } else {
                    None
                };
                jobs.push(DispatchJob::Forward {
                    url: url.clone(),
                    mode: *mode,
                    notification: notification.clone(),
                    current: filtered_current,
                    previous: filtered_previous,
                    diff: if *change_detection_enabled { diff.cloned() } else { None },
                });
            }
            Destination::RpaQueue {
                handler_name,
                queue_name,
                tenant_tag,
                folder_id,
                ..
            } => {
                let Some(current_fields) = current else {
                    jobs.push(DispatchJob::Skipped {
                        reason: "item data unavailable".to_string(),
                    });
                    continue;
                };
                jobs.push(DispatchJob::RpaQueue {
                    handler_name: handler_name.clone(),
                    overrides: QueueOverride {
                        tenant_tag: tenant_tag.clone(),
                        folder_id: folder_id.clone(),
                        queue_name: queue_name.clone(),
                    },
                    current: current_fields.clone(),
                    previous: previous.cloned(),
                });
            }
        }
    }
    jobs
}

/// The dedup bucket for one notification: its own `change_timestamp`
/// (normalized so equivalent ISO-8601 forms collide), or ingest time if the
/// platform omitted one entirely.
fn bucket_timestamp(change_timestamp: Option<&str>) -> String {
    match change_timestamp {
        Some(raw) => normalize_timestamp_str(raw),
        None => time_util::now().unix_timestamp().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use flowbridge_platform_client::PlatformError;
    use flowbridge_queue_client::{QueueClientError, QueueOutcome};
    use flowbridge_retry::RetryPolicy;
    use flowbridge_state_store::SqliteStateStore;
    use flowbridge_templates::DocumentProcessor;
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    struct FakeItemReader {
        fields: FieldMap,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ItemReader for FakeItemReader {
        async fn get_item_fields(&self, _resource: &Resource, _item_id: &ItemId) -> Result<FieldMap, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.fields.clone())
        }

        async fn most_recent_change(&self, _resource: &Resource) -> Result<Option<(ItemId, FieldMap)>, PlatformError> {
            Ok(Some((ItemId::from("1"), self.fields.clone())))
        }
    }

    struct FakeQueueClient {
        submissions: Mutex<usize>,
    }

    #[async_trait]
    impl QueueClient for FakeQueueClient {
        async fn submit(&self, _item: &flowbridge_common::QueueItem, _overrides: &QueueOverride) -> Result<QueueOutcome, QueueClientError> {
            *self.submissions.lock().unwrap() += 1;
            Ok(QueueOutcome::Success {
                item_id: "q-1".to_string(),
            })
        }
    }

    fn notification_json(subscription_id: &str, client_state: &str) -> serde_json::Value {
        json!({
            "subscription_id": subscription_id,
            "resource": "sites/a/lists/b",
            "change_type": "updated",
            "resource_data": { "id": "1" },
            "client_state": client_state,
            "change_timestamp": "2024-01-01T00:00:00Z",
        })
    }

    fn pipeline(
        item_reader: Arc<dyn ItemReader>,
        queue: Arc<dyn QueueClient>,
        forwarder_base_url: &str,
    ) -> Pipeline<SqliteStateStore> {
        let registry = Arc::new(TemplateRegistry::new());
        registry.register("document", Arc::new(DocumentProcessor));
        let forwarder = Arc::new(Forwarder::new(
            reqwest::Client::new(),
            RetryPolicy::new(1, Duration::from_millis(1)),
            forwarder_base_url,
        ));
        Pipeline::new(
            item_reader,
            ChangeDetector::new(SqliteStateStore::in_memory().unwrap()),
            registry,
            queue,
            forwarder,
            None,
            Duration::from_secs(60),
            10,
            "flowbridge",
        )
    }

    #[tokio::test]
    async fn malformed_entry_is_dropped_without_failing_the_batch() {
        let reader = Arc::new(FakeItemReader {
            fields: FieldMap::new(),
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(FakeQueueClient { submissions: Mutex::new(0) });
        let pipeline = pipeline(reader, queue, "https://callback.example");

        let outcomes = pipeline
            .process_batch(NotificationBatch {
                value: vec![json!({"not": "a notification"})],
            })
            .await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], NotificationOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn duplicate_within_ttl_is_suppressed() {
        let reader = Arc::new(FakeItemReader {
            fields: FieldMap::from([("id".to_string(), json!("1"))]),
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(FakeQueueClient { submissions: Mutex::new(0) });
        let pipeline = pipeline(reader, queue, "https://callback.example");

        let batch = NotificationBatch {
            value: vec![
                notification_json("sub-1", "destination:uipath|handler:document"),
                notification_json("sub-1", "destination:uipath|handler:document"),
            ],
        };
        let outcomes = pipeline.process_batch(batch).await;
        assert!(matches!(outcomes[0], NotificationOutcome::Dispatched { .. }));
        assert!(matches!(outcomes[1], NotificationOutcome::Duplicate));
    }

    /// Dispatch is initiated, not completed, by the time `process_batch`
    /// returns (§4.1 step 7): polls a condition instead of asserting it
    /// immediately, the way `flowbridge-token-cache`'s single-flight test
    /// waits out its own background work.
    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition did not become true in time");
    }

    #[tokio::test]
    async fn rpa_destination_submits_through_the_registered_processor() {
        let reader = Arc::new(FakeItemReader {
            fields: FieldMap::from([("id".to_string(), json!("1")), ("filename".to_string(), json!("a.docx"))]),
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(FakeQueueClient { submissions: Mutex::new(0) });
        let pipeline = pipeline(reader, queue.clone(), "https://callback.example");

        let outcomes = pipeline
            .process_batch(NotificationBatch {
                value: vec![notification_json("sub-1", "destination:uipath|handler:document")],
            })
            .await;
        match &outcomes[0] {
            NotificationOutcome::Dispatched { destination_count } => assert_eq!(*destination_count, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        wait_until(|| *queue.submissions.lock().unwrap() == 1).await;
    }

    #[tokio::test]
    async fn forward_destination_posts_the_envelope() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(200);
        });

        let reader = Arc::new(FakeItemReader {
            fields: FieldMap::new(),
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(FakeQueueClient { submissions: Mutex::new(0) });
        let pipeline = pipeline(reader, queue, "https://callback.example");

        let client_state = format!("destination:forward|url:{}|mode:simple", server.url("/hook"));
        let outcomes = pipeline
            .process_batch(NotificationBatch {
                value: vec![notification_json("sub-1", &client_state)],
            })
            .await;
        match &outcomes[0] {
            NotificationOutcome::Dispatched { destination_count } => assert_eq!(*destination_count, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        wait_until(|| mock.hits() > 0).await;
    }

    #[tokio::test]
    async fn empty_client_state_dispatches_to_nothing() {
        let reader = Arc::new(FakeItemReader {
            fields: FieldMap::new(),
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(FakeQueueClient { submissions: Mutex::new(0) });
        let pipeline = pipeline(reader, queue, "https://callback.example");

        let outcomes = pipeline
            .process_batch(NotificationBatch {
                value: vec![notification_json("sub-1", "")],
            })
            .await;
        assert!(matches!(
            outcomes[0],
            NotificationOutcome::Dispatched { destination_count: 0 }
        ));
    }
}
