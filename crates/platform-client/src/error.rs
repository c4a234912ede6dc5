#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("network error calling the collaboration platform: {0}")]
    Network(#[from] reqwest::Error),
    #[error("collaboration platform returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("item {item_id} not found on resource {resource}")]
    ItemNotFound { resource: String, item_id: String },
    #[error("subscription {0} not found")]
    SubscriptionNotFound(String),
    #[error("response body did not match the expected shape: {0}")]
    Deserialize(#[from] serde_json::Error),
}
