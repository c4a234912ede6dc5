/// Tagged submission outcome (§4.5). Every submission attempt — whether it
/// ultimately succeeded, failed terminally, or exhausted its retry budget —
/// ends up as one of these rather than a bare error, so callers never have
/// to guess whether a failure is worth surfacing to an operator.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Success { item_id: String },
    DuplicateReference,
    InvalidPayload { detail: String },
    MissingQueue,
    MissingFolder,
    AuthFailed,
    TransientFailure { attempts: usize },
}

impl QueueOutcome {
    pub fn is_success_equivalent(&self) -> bool {
        matches!(self, QueueOutcome::Success { .. } | QueueOutcome::DuplicateReference)
    }
}

/// Errors that prevent even attempting a submission — configuration
/// problems the retry loop can't paper over.
#[derive(Debug, thiserror::Error)]
pub enum QueueClientError {
    #[error("no tenant tag given and no default tenant configured")]
    NoDefaultTenant,
    #[error("unknown tenant tag: {0}")]
    UnknownTenant(String),
    #[error("network error calling the RPA provider: {0}")]
    Network(#[from] reqwest::Error),
    #[error("RPA provider response did not match the expected shape: {0}")]
    Deserialize(#[from] serde_json::Error),
}
