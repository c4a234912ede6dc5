//! Process-local, TTL-based suppression of same-batch duplicate
//! notifications (§3.1 `DedupKey`, §4.1 step 2, §8 invariant S6).
//!
//! Same singleton pattern as the token cache and template registry (§9
//! "global mutable state"): a `DashMap` keyed on the dedup key, holding the
//! expiry of the most recent sighting. Tests build a fresh instance.

use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;

/// `(subscription_id, change_timestamp_bucket)`. The bucket is a
/// caller-computed coarsening of the notification's own timestamp (or
/// ingest time, if the platform omitted one) so that near-simultaneous
/// redeliveries of the same event collide on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub subscription_id: String,
    pub change_timestamp_bucket: String,
}

impl DedupKey {
    pub fn new(subscription_id: impl Into<String>, change_timestamp_bucket: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            change_timestamp_bucket: change_timestamp_bucket.into(),
        }
    }
}

pub struct DedupCache {
    ttl: Duration,
    seen: DashMap<DedupKey, OffsetDateTime>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: DashMap::new(),
        }
    }

    /// Records a sighting of `key` and reports whether this is the first one
    /// within the TTL window. Expired entries are treated as absent and
    /// overwritten in place, which also bounds the map's size without a
    /// separate sweep task.
    pub fn observe(&self, key: DedupKey) -> bool {
        let now = OffsetDateTime::now_utc();
        let ttl = time::Duration::try_from(self.ttl).unwrap_or(time::Duration::ZERO);

        match self.seen.get(&key) {
            Some(expires_at) if now < *expires_at => {
                drop(expires_at);
                false
            }
            _ => {
                self.seen.insert(key, now + ttl);
                true
            }
        }
    }
}
