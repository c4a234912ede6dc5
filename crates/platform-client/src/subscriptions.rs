use async_trait::async_trait;
use flowbridge_common::{ChangeType, Resource, Subscription};
use flowbridge_retry::{retry, Action};
use time::{Duration, OffsetDateTime};

use crate::{PlatformError, PlatformTransport};

/// The platform's cap on how long a subscription can live before it must be
/// renewed — "typically ~3 days" per §4.7.
pub const PLATFORM_MAX_SUBSCRIPTION_LIFETIME: Duration = Duration::hours(72);

/// CRUD against the collaboration platform's subscription resource, plus
/// renewal. `LifecycleManager` is the only caller; this trait exists so it
/// can be tested against a hand-written fake instead of real HTTP.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn create(
        &self,
        resource: &Resource,
        change_type: ChangeType,
        callback_url: &str,
        client_state: &str,
    ) -> Result<Subscription, PlatformError>;

    async fn list(&self) -> Result<Vec<Subscription>, PlatformError>;

    async fn delete(&self, subscription_id: &str) -> Result<(), PlatformError>;

    /// Extends `subscription_id`'s expiry to the platform maximum.
    async fn renew(&self, subscription_id: &str) -> Result<Subscription, PlatformError>;
}

pub struct HttpSubscriptionApi {
    pub(crate) transport: PlatformTransport,
}

#[derive(serde::Serialize)]
struct CreateSubscriptionRequest<'a> {
    resource: &'a str,
    change_type: &'a str,
    notification_url: &'a str,
    client_state: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    expiration_date_time: OffsetDateTime,
}

#[derive(serde::Serialize)]
struct RenewSubscriptionRequest {
    #[serde(with = "time::serde::rfc3339")]
    expiration_date_time: OffsetDateTime,
}

#[derive(serde::Deserialize)]
struct SubscriptionWire {
    id: String,
    resource: String,
    change_type: String,
    notification_url: String,
    client_state: String,
    #[serde(with = "time::serde::rfc3339")]
    expiration_date_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_date_time: Option<OffsetDateTime>,
}

impl From<SubscriptionWire> for Subscription {
    fn from(wire: SubscriptionWire) -> Self {
        Subscription {
            id: wire.id,
            resource: Resource::from(wire.resource),
            change_type: parse_change_type(&wire.change_type),
            callback_url: wire.notification_url,
            client_state: wire.client_state,
            expires_at: wire.expiration_date_time,
            created_at: wire.created_date_time.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}

fn parse_change_type(raw: &str) -> ChangeType {
    match raw {
        "added" => ChangeType::Added,
        "updated" => ChangeType::Updated,
        "deleted" => ChangeType::Deleted,
        _ => ChangeType::Combination,
    }
}

fn change_type_wire(change_type: ChangeType) -> &'static str {
    match change_type {
        ChangeType::Added => "added",
        ChangeType::Updated => "updated",
        ChangeType::Deleted => "deleted",
        ChangeType::Combination => "updated,deleted",
    }
}

impl HttpSubscriptionApi {
    async fn authorized(
        &self,
        build: impl Fn(reqwest::Client, String) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PlatformError> {
        let (outcome, _attempts) = retry(
            self.transport.config.retry_policy,
            |_attempt| async {
                let mut auth_retried = false;
                loop {
                    let token = self.transport.bearer_token().await?;
                    let response = build(self.transport.http.clone(), token)
                        .send()
                        .await
                        .map_err(PlatformError::Network)?;
                    let status = response.status().as_u16();
                    if (status == 401 || status == 403) && !auth_retried {
                        auth_retried = true;
                        self.transport.invalidate_token();
                        continue;
                    }
                    return Ok::<_, PlatformError>(response);
                }
            },
            |outcome| match outcome {
                Ok(response) if response.status().is_success() => Action::Stop,
                Ok(response)
                    if response.status().as_u16() == 429 || response.status().is_server_error() =>
                {
                    Action::Retry
                }
                Ok(_) => Action::Stop,
                Err(_) => Action::Retry,
            },
        )
        .await;
        outcome
    }
}

#[async_trait]
impl SubscriptionApi for HttpSubscriptionApi {
    async fn create(
        &self,
        resource: &Resource,
        change_type: ChangeType,
        callback_url: &str,
        client_state: &str,
    ) -> Result<Subscription, PlatformError> {
        let url = format!("{}/subscriptions", self.transport.config.base_url);
        let body = CreateSubscriptionRequest {
            resource: resource.as_str(),
            change_type: change_type_wire(change_type),
            notification_url: callback_url,
            client_state,
            expiration_date_time: OffsetDateTime::now_utc() + PLATFORM_MAX_SUBSCRIPTION_LIFETIME,
        };
        let response = self
            .authorized(|client, token| {
                client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&body)
            })
            .await?;
        if !response.status().is_success() {
            return Err(PlatformError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let wire: SubscriptionWire = response.json().await.map_err(PlatformError::Network)?;
        Ok(wire.into())
    }

    async fn list(&self) -> Result<Vec<Subscription>, PlatformError> {
        let url = format!("{}/subscriptions", self.transport.config.base_url);
        let response = self
            .authorized(move |client, token| client.get(&url).bearer_auth(token))
            .await?;
        if !response.status().is_success() {
            return Err(PlatformError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        #[derive(serde::Deserialize)]
        struct ListResponse {
            value: Vec<SubscriptionWire>,
        }
        let parsed: ListResponse = response.json().await.map_err(PlatformError::Network)?;
        Ok(parsed.value.into_iter().map(Subscription::from).collect())
    }

    async fn delete(&self, subscription_id: &str) -> Result<(), PlatformError> {
        let url = format!(
            "{}/subscriptions/{}",
            self.transport.config.base_url, subscription_id
        );
        let response = self
            .authorized(move |client, token| client.delete(&url).bearer_auth(token))
            .await?;
        if response.status().as_u16() == 404 {
            return Err(PlatformError::SubscriptionNotFound(subscription_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(PlatformError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn renew(&self, subscription_id: &str) -> Result<Subscription, PlatformError> {
        let url = format!(
            "{}/subscriptions/{}",
            self.transport.config.base_url, subscription_id
        );
        let body = RenewSubscriptionRequest {
            expiration_date_time: OffsetDateTime::now_utc() + PLATFORM_MAX_SUBSCRIPTION_LIFETIME,
        };
        let response = self
            .authorized(|client, token| {
                client
                    .patch(&url)
                    .bearer_auth(token)
                    .json(&body)
            })
            .await?;
        if response.status().as_u16() == 404 {
            return Err(PlatformError::SubscriptionNotFound(subscription_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(PlatformError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let wire: SubscriptionWire = response.json().await.map_err(PlatformError::Network)?;
        Ok(wire.into())
    }
}
