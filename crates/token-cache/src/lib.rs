//! Process-wide cache of OAuth2 client-credentials bearer tokens, one entry
//! per `(provider, tenant)` pair (§4.5, §9 "token cache across cold
//! starts").
//!
//! The cache is a deliberate process-global singleton, same as the
//! dedup cache and the template registry — see the "global mutable state"
//! design note. It is cheap to construct, so tests build a fresh one
//! instead of sharing process state.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// A safety margin subtracted from the provider's reported `expires_in` so
/// a token is never used right up against the wire.
const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub provider: String,
    pub tenant: String,
}

impl TokenKey {
    pub fn new(provider: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tenant: tenant.into(),
        }
    }
}

/// What a token endpoint call returns.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Duration,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: OffsetDateTime,
}

impl CachedToken {
    fn from_response(response: TokenResponse, acquired_at: OffsetDateTime) -> Self {
        let ttl = response
            .expires_in
            .checked_sub(EXPIRY_SAFETY_MARGIN)
            .unwrap_or(Duration::ZERO);
        Self {
            access_token: response.access_token,
            expires_at: acquired_at + ttl,
        }
    }

    fn is_usable(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

type Slot = Arc<Mutex<Option<CachedToken>>>;

/// In-memory, single-flight bearer-token cache.
#[derive(Default)]
pub struct TokenCache {
    slots: DashMap<TokenKey, Slot>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached, still-valid token for `key`, or calls `fetch` to
    /// acquire a new one. Concurrent callers for the same key coalesce onto
    /// a single in-flight `fetch` call: everyone but the first blocks on the
    /// slot's mutex and then observes the token the first caller stored.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: TokenKey, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<TokenResponse, E>>,
    {
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock().await;
        let now = OffsetDateTime::now_utc();
        if let Some(cached) = guard.as_ref() {
            if cached.is_usable(now) {
                return Ok(cached.access_token.clone());
            }
        }

        tracing::debug!(provider = %key.provider, tenant = %key.tenant, "refreshing bearer token");
        let response = fetch().await?;
        let cached = CachedToken::from_response(response, now);
        let token = cached.access_token.clone();
        *guard = Some(cached);
        Ok(token)
    }

    /// Forces the next `get_or_fetch` for `key` to refresh, used after an
    /// authentication failure so the one-time retry in §4.5/§7 gets a fresh
    /// token rather than replaying the one that just failed.
    pub fn invalidate(&self, key: &TokenKey) {
        if let Some(slot) = self.slots.get(key) {
            // `try_lock` is enough: if someone else is mid-refresh there's
            // nothing stale to clear.
            if let Ok(mut guard) = slot.try_lock() {
                *guard = None;
            }
        }
    }
}
