use crate::fields::FieldMap;
use crate::resource::Resource;

/// The kind of change a subscription was registered for, or that a
/// particular notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    Added,
    Updated,
    Deleted,
    /// `updated,deleted` style combined subscriptions.
    Combination,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeType::Added => "added",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
            ChangeType::Combination => "combination",
        };
        f.write_str(s)
    }
}

/// The portion of a notification that identifies which resource changed,
/// when the platform includes it. `id` is the only field ingress relies on;
/// anything else the platform sends along rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceData {
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

/// A single change event delivered by the platform. Never persisted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Notification {
    pub subscription_id: String,
    pub resource: Resource,
    pub change_type: ChangeType,
    #[serde(default)]
    pub resource_data: Option<ResourceData>,
    #[serde(default)]
    pub client_state: Option<String>,
    /// The platform's own change timestamp for this event, used to derive
    /// the dedup bucket. Falls back to ingest time if the platform omits it.
    #[serde(default)]
    pub change_timestamp: Option<String>,
}

impl Notification {
    pub fn item_id(&self) -> Option<&str> {
        self.resource_data.as_ref().and_then(|d| d.id.as_deref())
    }
}
