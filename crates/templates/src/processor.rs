use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowbridge_common::{FieldMap, QueueItem, ValidationError};
use flowbridge_queue_client::{QueueClient, QueueClientError, QueueOutcome, QueueOverride};

/// What came of running one processor against one notification's state.
/// Every branch is an expected, loggable shape (§4.4) — nothing here
/// propagates as an error to the caller, since a single destination's
/// outcome must never abort its siblings (§5).
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Submitted(QueueOutcome),
    Skipped { reason: String },
    ValidationFailed(ValidationError),
    SubmissionError(String),
}

/// A named, pluggable transform from platform item state to a submitted
/// queue item (§4.4). Implementations provide the three building blocks;
/// the default `process` wires them together the same way for every
/// processor, so individual processors never talk to the queue client
/// directly.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Gate: whether this notification should produce a queue submission at
    /// all. Given both current and previous state so a processor can derive
    /// "transition to X" without assuming the notification it received is
    /// the first observation of that transition (§5).
    fn should_process(&self, current: &FieldMap, previous: Option<&FieldMap>) -> bool;

    /// Checks that `current` carries whatever fields this processor's
    /// `transform` depends on.
    fn validate(&self, current: &FieldMap) -> Result<(), ValidationError>;

    /// Builds the queue item. Only called after `validate` succeeds.
    fn transform(&self, current: &FieldMap) -> QueueItem;

    async fn process(
        &self,
        current: &FieldMap,
        previous: Option<&FieldMap>,
        queue: &dyn QueueClient,
        overrides: &QueueOverride,
    ) -> ProcessOutcome {
        if !self.should_process(current, previous) {
            return ProcessOutcome::Skipped {
                reason: "conditions not met".to_string(),
            };
        }
        if let Err(err) = self.validate(current) {
            return ProcessOutcome::ValidationFailed(err);
        }
        let item = self.transform(current);
        match queue.submit(&item, overrides).await {
            Ok(outcome) => ProcessOutcome::Submitted(outcome),
            Err(QueueClientError::NoDefaultTenant) | Err(QueueClientError::UnknownTenant(_)) => {
                ProcessOutcome::SubmissionError(
                    "queue submission misconfigured: no matching tenant preset".to_string(),
                )
            }
            Err(err) => ProcessOutcome::SubmissionError(err.to_string()),
        }
    }
}

/// Maps a routing spec's `handler_name` to a registered [`Processor`]
/// (§4.4, §9 "global mutable state"). A process-wide singleton, same as the
/// token cache and the dedup cache; tests build a fresh instance.
#[derive(Default)]
pub struct TemplateRegistry {
    processors: DashMap<String, Arc<dyn Processor>>,
}

/// A routing spec named a handler this registry has no entry for.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown template handler: {0}")]
pub struct UnknownHandlerError(pub String);

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.processors.insert(name.into(), processor);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Processor>, UnknownHandlerError> {
        self.processors
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| UnknownHandlerError(name.to_string()))
    }
}
