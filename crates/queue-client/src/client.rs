use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowbridge_client_state::TenantTag;
use flowbridge_common::QueueItem;
use flowbridge_retry::{retry, Action, RetryPolicy};
use flowbridge_token_cache::{TokenCache, TokenKey, TokenResponse};

use crate::presets::TenantPresetTable;
use crate::{QueueClientError, QueueOutcome};

/// Per-call overrides a routing destination can supply, taken straight from
/// a `RpaQueue` destination (§4.5 "environment selection").
#[derive(Debug, Clone, Default)]
pub struct QueueOverride {
    pub tenant_tag: Option<TenantTag>,
    pub folder_id: Option<String>,
    pub queue_name: Option<String>,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn submit(
        &self,
        item: &QueueItem,
        overrides: &QueueOverride,
    ) -> Result<QueueOutcome, QueueClientError>;
}

pub struct HttpQueueClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    presets: TenantPresetTable,
    token_cache: Arc<TokenCache>,
    retry_policy: RetryPolicy,
}

impl HttpQueueClient {
    pub fn new(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        presets: TenantPresetTable,
        token_cache: Arc<TokenCache>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            presets,
            token_cache,
            retry_policy,
        }
    }

    async fn fetch_token(&self, token_endpoint: &str) -> Result<TokenResponse, QueueClientError> {
        #[derive(serde::Deserialize)]
        struct Wire {
            access_token: String,
            expires_in: u64,
        }
        let response = self
            .http
            .post(token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let wire: Wire = response.json().await?;
        Ok(TokenResponse {
            access_token: wire.access_token,
            expires_in: Duration::from_secs(wire.expires_in),
        })
    }

    async fn post_once(
        &self,
        base_url: &str,
        token: &str,
        tenant_name: &str,
        folder_id: &str,
        queue_name: &str,
        item: &QueueItem,
    ) -> Result<RawOutcome, QueueClientError> {
        #[derive(serde::Serialize)]
        struct Body<'a> {
            #[serde(flatten)]
            item: &'a QueueItem,
            queue_name: &'a str,
        }

        let url = format!("{base_url}/odata/Queues/UiPathODataSvc.AddQueueItem");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("X-Tenant-Name", tenant_name)
            .header("X-Organization-Unit-Id", folder_id)
            .json(&Body {
                item,
                queue_name,
            })
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200 | 201 => {
                #[derive(serde::Deserialize)]
                struct Created {
                    id: serde_json::Value,
                }
                let body: Created = response.json().await?;
                Ok(RawOutcome::Success(body.id.to_string()))
            }
            409 => Ok(RawOutcome::Duplicate),
            400 => Ok(RawOutcome::BadRequest(response.text().await.unwrap_or_default())),
            401 | 403 => Ok(RawOutcome::AuthFailed),
            404 => {
                let body = response.text().await.unwrap_or_default();
                if body.to_ascii_lowercase().contains("folder") {
                    Ok(RawOutcome::NotFoundFolder)
                } else {
                    Ok(RawOutcome::NotFoundQueue)
                }
            }
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(1));
                Ok(RawOutcome::RateLimited(retry_after))
            }
            code if (500..600).contains(&code) => Ok(RawOutcome::ServerError),
            _ => Ok(RawOutcome::BadRequest(response.text().await.unwrap_or_default())),
        }
    }
}

enum RawOutcome {
    Success(String),
    Duplicate,
    BadRequest(String),
    NotFoundQueue,
    NotFoundFolder,
    AuthFailed,
    RateLimited(Duration),
    ServerError,
}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn submit(
        &self,
        item: &QueueItem,
        overrides: &QueueOverride,
    ) -> Result<QueueOutcome, QueueClientError> {
        let preset = self.presets.resolve(overrides.tenant_tag.as_ref())?;
        let folder_id = overrides
            .folder_id
            .clone()
            .unwrap_or_else(|| preset.default_folder_id.clone());
        let queue_name = overrides
            .queue_name
            .clone()
            .unwrap_or_else(|| preset.default_queue.clone());
        let token_key = TokenKey::new("rpa", &preset.tenant_name);

        let (outcome, attempts) = retry(
            self.retry_policy,
            |_attempt| async {
                let mut auth_retried = false;
                loop {
                    let token = self
                        .token_cache
                        .get_or_fetch(token_key.clone(), || self.fetch_token(&preset.token_endpoint))
                        .await?;
                    let raw = self
                        .post_once(
                            &preset.base_url,
                            &token,
                            &preset.tenant_name,
                            &folder_id,
                            &queue_name,
                            item,
                        )
                        .await?;
                    if matches!(raw, RawOutcome::AuthFailed) && !auth_retried {
                        auth_retried = true;
                        self.token_cache.invalidate(&token_key);
                        continue;
                    }
                    return Ok::<_, QueueClientError>(raw);
                }
            },
            |outcome: &Result<RawOutcome, QueueClientError>| match outcome {
                Ok(RawOutcome::RateLimited(delay)) => Action::RetryAfter(*delay),
                Ok(RawOutcome::ServerError) => Action::Retry,
                Ok(_) => Action::Stop,
                Err(_) => Action::Retry,
            },
        )
        .await;

        Ok(match outcome {
            Ok(RawOutcome::Success(item_id)) => QueueOutcome::Success { item_id },
            Ok(RawOutcome::Duplicate) => QueueOutcome::DuplicateReference,
            Ok(RawOutcome::BadRequest(detail)) => QueueOutcome::InvalidPayload { detail },
            Ok(RawOutcome::NotFoundQueue) => QueueOutcome::MissingQueue,
            Ok(RawOutcome::NotFoundFolder) => QueueOutcome::MissingFolder,
            Ok(RawOutcome::AuthFailed) => QueueOutcome::AuthFailed,
            Ok(RawOutcome::RateLimited(_)) | Ok(RawOutcome::ServerError) => {
                QueueOutcome::TransientFailure { attempts }
            }
            Err(error) => {
                tracing::warn!(%error, attempts, "queue submission exhausted retries on a network error");
                QueueOutcome::TransientFailure { attempts }
            }
        })
    }
}
