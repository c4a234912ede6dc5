//! Thin wrapper over the collaboration platform's REST surface: reading
//! item state and change feeds ([`ItemReader`]) and managing subscriptions
//! ([`SubscriptionApi`]).
//!
//! Both halves share one authenticated HTTP client and one token-cache
//! entry (`provider = "platform"`), since in the deployed system they're
//! the same app registration against the same tenant.

mod error;
mod items;
mod subscriptions;

pub use error::PlatformError;
pub use items::{HttpItemReader, ItemReader};
pub use subscriptions::{HttpSubscriptionApi, SubscriptionApi, PLATFORM_MAX_SUBSCRIPTION_LIFETIME};

use std::sync::Arc;

use flowbridge_retry::RetryPolicy;
use flowbridge_token_cache::TokenCache;

/// Credentials and endpoints for the collaboration platform app
/// registration (§6.4: platform tenant id / client id / client secret).
#[derive(Clone)]
pub struct PlatformConfig {
    pub base_url: String,
    pub token_endpoint: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub retry_policy: RetryPolicy,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("base_url", &self.base_url)
            .field("token_endpoint", &self.token_endpoint)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

/// Shared plumbing: the HTTP client, config, and token cache handle used by
/// both [`HttpItemReader`] and [`HttpSubscriptionApi`].
#[derive(Clone)]
pub(crate) struct PlatformTransport {
    pub(crate) http: reqwest::Client,
    pub(crate) config: PlatformConfig,
    pub(crate) token_cache: Arc<TokenCache>,
}

pub fn new_transport(
    http: reqwest::Client,
    config: PlatformConfig,
    token_cache: Arc<TokenCache>,
) -> (HttpItemReader, HttpSubscriptionApi) {
    let transport = PlatformTransport {
        http,
        config,
        token_cache,
    };
    (
        HttpItemReader {
            transport: transport.clone(),
        },
        HttpSubscriptionApi { transport },
    )
}

impl PlatformTransport {
    fn token_key(&self) -> flowbridge_token_cache::TokenKey {
        flowbridge_token_cache::TokenKey::new("platform", &self.config.tenant_id)
    }

    /// Drops the cached token so the next [`bearer_token`] call fetches a
    /// fresh one. Used after a 401/403 to retry once with a new token
    /// instead of surfacing the stale one's failure straight away.
    ///
    /// [`bearer_token`]: PlatformTransport::bearer_token
    pub(crate) fn invalidate_token(&self) {
        self.token_cache.invalidate(&self.token_key());
    }

    pub(crate) async fn bearer_token(&self) -> Result<String, PlatformError> {
        use flowbridge_token_cache::TokenResponse;
        let key = self.token_key();
        self.token_cache
            .get_or_fetch(key, || async {
                let response = self
                    .http
                    .post(&self.config.token_endpoint)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", self.config.client_id.as_str()),
                        ("client_secret", self.config.client_secret.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(PlatformError::Network)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(PlatformError::Http {
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }
                let body: TokenEndpointResponse =
                    response.json().await.map_err(PlatformError::Network)?;
                Ok(TokenResponse {
                    access_token: body.access_token,
                    expires_in: std::time::Duration::from_secs(body.expires_in),
                })
            })
            .await
    }
}

#[derive(serde::Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    expires_in: u64,
}
