use std::collections::HashMap;

use flowbridge_client_state::TenantTag;

use crate::QueueClientError;

/// Everything a `(tenant_tag → environment)` resolution needs: the token
/// endpoint, the tenant name header value, the queue API base URL, and the
/// defaults used when a destination doesn't override them.
#[derive(Debug, Clone)]
pub struct TenantPreset {
    pub token_endpoint: String,
    pub tenant_name: String,
    pub base_url: String,
    pub default_folder_id: String,
    pub default_queue: String,
}

/// `{DEV → {...}, PROD → {...}}` plus whatever custom tags the operator has
/// configured (§6.4). Custom tenant tags with no matching entry are a
/// configuration error, not a retryable failure.
#[derive(Debug, Clone, Default)]
pub struct TenantPresetTable {
    presets: HashMap<String, TenantPreset>,
    default_tag: Option<String>,
}

impl TenantPresetTable {
    pub fn new(default_tag: Option<String>) -> Self {
        Self {
            presets: HashMap::new(),
            default_tag,
        }
    }

    pub fn insert(&mut self, tag: impl Into<String>, preset: TenantPreset) -> &mut Self {
        self.presets.insert(tag.into(), preset);
        self
    }

    pub fn resolve(&self, tag: Option<&TenantTag>) -> Result<&TenantPreset, QueueClientError> {
        let key = match tag {
            Some(tag) => tag.to_string(),
            None => self
                .default_tag
                .clone()
                .ok_or(QueueClientError::NoDefaultTenant)?,
        };
        self.presets
            .get(&key)
            .ok_or_else(|| QueueClientError::UnknownTenant(key))
    }
}
