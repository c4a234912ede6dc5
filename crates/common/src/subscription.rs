use time::OffsetDateTime;

use crate::notification::ChangeType;
use crate::resource::{ItemId, Resource};
use crate::fields::FieldMap;

/// A platform-managed pledge to receive change notifications for one list.
///
/// `Subscription`s are owned by the collaboration platform; this struct is a
/// non-authoritative local mirror used by the lifecycle manager and the
/// tracking-list reconciler.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Subscription {
    pub id: String,
    pub resource: Resource,
    pub change_type: ChangeType,
    pub callback_url: String,
    pub client_state: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Subscription {
    pub fn is_within_renewal_window(&self, window: time::Duration, now: OffsetDateTime) -> bool {
        self.expires_at - now <= window
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Per-item state baseline, keyed by `(resource, item_id)`.
///
/// Invariant: at most one snapshot exists per key, and writes are
/// last-writer-wins — there is no optimistic-concurrency check on `put`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ItemSnapshot {
    pub resource: Resource,
    pub item_id: ItemId,
    pub fields: FieldMap,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub etag_or_version: Option<String>,
}

impl ItemSnapshot {
    pub fn new(resource: Resource, item_id: ItemId, fields: FieldMap) -> Self {
        Self {
            resource,
            item_id,
            fields,
            captured_at: crate::time_util::now(),
            etag_or_version: None,
        }
    }
}
