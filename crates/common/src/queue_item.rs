use time::OffsetDateTime;

use crate::fields::FieldMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// The provider's documented limits on a couple of string fields. Processors
/// are expected to respect these when building a [`QueueItem`]; the queue
/// client does not truncate on their behalf, since silently chopping a
/// reference could merge two distinct idempotency keys.
pub const MAX_NAME_LEN: usize = 400;
pub const MAX_REFERENCE_LEN: usize = 128;

/// The payload submitted to the RPA provider's add-queue-item endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueueItem {
    pub name: String,
    pub priority: Priority,
    /// Idempotency key: two submissions with the same reference are treated
    /// by the provider as one logical item.
    pub reference: String,
    pub specific_content: FieldMap,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
}
