use std::time::Duration;

use flowbridge_retry::{retry, Action, RetryPolicy};
use url::Url;

use crate::envelope::Envelope;
use crate::error::ForwarderError;

/// Parses the configured callback base URL once at construction so every
/// loop-prevention check is a cheap host comparison rather than a reparse.
pub struct Forwarder {
    http: reqwest::Client,
    retry_policy: RetryPolicy,
    callback_host: Option<String>,
}

impl Forwarder {
    pub fn new(http: reqwest::Client, retry_policy: RetryPolicy, callback_base_url: &str) -> Self {
        let callback_host = Url::parse(callback_base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
        Self {
            http,
            retry_policy,
            callback_host,
        }
    }

    fn check_target(&self, url: &str) -> Result<Url, ForwarderError> {
        let parsed = Url::parse(url).map_err(|_| ForwarderError::InvalidUrl(url.to_string()))?;
        // Loopback destinations are exempt from the https requirement: local
        // sinks (a sidecar, a test harness) never leave the host, so there is
        // nothing for TLS to protect against.
        let is_loopback = matches!(parsed.host_str(), Some(host) if host == "localhost" || host == "127.0.0.1" || host == "::1");
        if parsed.scheme() != "https" && !is_loopback {
            return Err(ForwarderError::InsecureUrl(url.to_string()));
        }
        if let (Some(target_host), Some(callback_host)) =
            (parsed.host_str(), self.callback_host.as_deref())
        {
            if target_host.eq_ignore_ascii_case(callback_host) {
                return Err(ForwarderError::LoopDetected(target_host.to_string()));
            }
        }
        Ok(parsed)
    }

    /// POSTs `envelope` to `url`, retrying transient failures (network
    /// errors, 5xx, 429) with backoff. Unlike the queue client, *every* 4xx
    /// is terminal here — an arbitrary forward target rejecting a request is
    /// assumed intentional, not a provider quirk to work around (§4.6).
    pub async fn forward(&self, url: &str, envelope: &Envelope) -> Result<(), ForwarderError> {
        let target = self.check_target(url)?;

        let (outcome, attempts) = retry(
            self.retry_policy,
            |_attempt| async {
                self.http
                    .post(target.clone())
                    .json(envelope)
                    .send()
                    .await
                    .map_err(ForwarderError::Network)
            },
            |outcome: &Result<reqwest::Response, ForwarderError>| match outcome {
                Ok(response) if response.status().is_success() => Action::Stop,
                Ok(response) if response.status().as_u16() == 429 => {
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    match retry_after {
                        Some(delay) => Action::RetryAfter(delay),
                        None => Action::Retry,
                    }
                }
                Ok(response) if response.status().is_server_error() => Action::Retry,
                Ok(_) => Action::Stop,
                Err(_) => Action::Retry,
            },
        )
        .await;

        match outcome {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                if status == 429 || (500..600).contains(&status) {
                    Err(ForwarderError::Exhausted { attempts })
                } else {
                    Err(ForwarderError::Rejected { status, body })
                }
            }
            Err(_) => Err(ForwarderError::Exhausted { attempts }),
        }
    }
}
