//! Shared domain types for the flowbridge notification-to-queue integration hub.
//!
//! Every other crate in the workspace depends on this one for the entities
//! described by the data model: resources, item snapshots, notifications,
//! diffs and tracking records. Keeping them here avoids each subsystem
//! inventing its own (slightly different) notion of "a field map".

pub mod diff;
pub mod fields;
pub mod notification;
pub mod queue_item;
pub mod resource;
pub mod subscription;
pub mod time_util;
pub mod tracking;

pub use diff::{Diff, FieldChange};
pub use fields::{FieldMap, FieldValue};
pub use notification::{ChangeType, Notification, ResourceData};
pub use queue_item::{Priority, QueueItem};
pub use resource::{normalize, ItemId, Resource};
pub use subscription::{ItemSnapshot, Subscription};
pub use tracking::{TrackingRecord, TrackingStatus};

/// A field-level validation failure, shared by the client-state parser and
/// the template processors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("missing required fields: {missing_fields:?}")]
pub struct ValidationError {
    pub missing_fields: Vec<String>,
}
