//! A small, hand-rolled retry loop shared by [`flowbridge_queue_client`] and
//! [`flowbridge_forwarder`][forwarder].
//!
//! `tokio-retry`'s [`Retry::spawn`][spawn] is a good fit when every error is
//! retryable, but §4.5/§4.6 of the design need per-attempt classification
//! (stop on 4xx, honor a server-supplied `Retry-After`, refresh a token
//! exactly once) that doesn't map cleanly onto that API. We keep
//! `tokio-retry` for what it is good at: computing the jittered exponential
//! backoff sequence.
//!
//! [spawn]: tokio_retry::Retry::spawn
//! [forwarder]: https://docs.rs/flowbridge-forwarder
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};

/// What the caller's classifier decided to do with the outcome of one
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The operation succeeded or failed terminally; stop.
    Stop,
    /// Retry after the policy's computed backoff delay.
    Retry,
    /// Retry after this specific delay instead (e.g. a `Retry-After`
    /// header), without consuming the backoff sequence's growth.
    RetryAfter(Duration),
}

/// Retry policy: attempt budget and backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay.as_millis().max(1) as u64).map(jitter)
    }
}

/// Runs `attempt` up to `policy.max_attempts` times, calling `classify` on
/// each outcome to decide whether to stop or retry (and after how long).
///
/// Returns the last outcome once `classify` says to stop or attempts are
/// exhausted. The number of attempts actually made is returned alongside the
/// result so callers can report it (e.g. `TransientFailure { attempts }`).
pub async fn retry<T, E, Attempt, Fut, Classify>(
    policy: RetryPolicy,
    mut attempt: Attempt,
    mut classify: Classify,
) -> (Result<T, E>, usize)
where
    Attempt: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    Classify: FnMut(&Result<T, E>) -> Action,
{
    let mut backoff = policy.backoff();
    let mut attempts_made = 0;
    loop {
        attempts_made += 1;
        let outcome = attempt(attempts_made).await;
        let action = classify(&outcome);
        let is_last_attempt = attempts_made >= policy.max_attempts;
        match action {
            Action::Stop => return (outcome, attempts_made),
            _ if is_last_attempt => return (outcome, attempts_made),
            Action::Retry => {
                let delay = backoff.next().unwrap_or(policy.base_delay);
                tracing::debug!(attempt = attempts_made, ?delay, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
            Action::RetryAfter(delay) => {
                // Consume one slot of the backoff sequence so a subsequent
                // `Action::Retry` keeps growing from where we left off.
                backoff.next();
                tracing::debug!(attempt = attempts_made, ?delay, "retrying after server-requested delay");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn stops_immediately_on_terminal_error() {
        let calls = AtomicUsize::new(0);
        let (result, attempts) = retry(
            RetryPolicy::new(3, Duration::from_millis(1)),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<(), &str>("bad request"))
            },
            |_| Action::Stop,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_up_to_max_attempts() {
        let calls = AtomicUsize::new(0);
        let (result, attempts) = retry(
            RetryPolicy::new(3, Duration::from_millis(1)),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<(), &str>("transient"))
            },
            |_| Action::Retry,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_one_retry() {
        let calls = AtomicUsize::new(0);
        let (result, attempts) = retry(
            RetryPolicy::new(3, Duration::from_millis(1)),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(if attempt < 2 {
                    Err::<u32, &str>("transient")
                } else {
                    Ok(42)
                })
            },
            |outcome| match outcome {
                Ok(_) => Action::Stop,
                Err(_) => Action::Retry,
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 2);
    }
}
