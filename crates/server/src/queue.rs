use async_trait::async_trait;
use flowbridge_common::QueueItem;
use flowbridge_queue_client::{QueueClient, QueueClientError, QueueOutcome, QueueOverride};

/// Stands in for [`flowbridge_queue_client::HttpQueueClient`] when the RPA
/// integration feature flag is off (§6.4 `enable-rpa`). Every submission is
/// reported back as [`QueueOutcome::MissingQueue`] rather than silently
/// dropped, so callers and operators can tell "would have queued, but RPA
/// is disabled" apart from an actual provider failure.
pub struct DisabledQueueClient;

#[async_trait]
impl QueueClient for DisabledQueueClient {
    async fn submit(&self, item: &QueueItem, _overrides: &QueueOverride) -> Result<QueueOutcome, QueueClientError> {
        tracing::debug!(reference = %item.reference, "rpa integration disabled, dropping queue submission");
        Ok(QueueOutcome::MissingQueue)
    }
}
