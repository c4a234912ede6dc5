use crate::resource::Resource;

/// Lifecycle state of a row in the external tracking list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    Active,
    Deleted,
}

/// A row in the tracking list mirroring a [`crate::Subscription`] with a
/// human-readable description and a running notification counter.
///
/// Invariant: `subscription_id` uniquely identifies a record; the
/// reconciler converges these rows to the set of live subscriptions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackingRecord {
    pub subscription_id: String,
    pub resource: Resource,
    pub client_state: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: time::OffsetDateTime,
    pub description: String,
    pub notification_count: u64,
    pub status: TrackingStatus,
}
