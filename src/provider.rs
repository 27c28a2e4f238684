//! The provider seam and the retry policy shared by its callers.
//!
//! [`TweetProvider`] is the only thing pagination and backfill know about the
//! outside world; production uses [`crate::client::RapidApiClient`], tests
//! script their own.

use crate::error::ProviderError;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Remote source of timeline pages and tweet lookups.
pub trait TweetProvider: Sync {
    /// Resolve a handle to its user payload.
    fn resolve_user(&self, screen_name: &str) -> impl Future<Output = ProviderResult<Value>> + Send;

    /// One page of the user's posts-and-replies timeline.
    fn fetch_timeline_page(
        &self,
        user_id: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = ProviderResult<Value>> + Send;

    /// Look up tweets by id. Callers never pass more than 20 ids.
    fn lookup_tweets(&self, ids: &[String]) -> impl Future<Output = ProviderResult<Value>> + Send;
}

/// How many times to try a call and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Added on top of the backoff after an HTTP 429.
    pub rate_limit_cooldown: Duration,
}

impl RetryPolicy {
    const MAX_DELAY: Duration = Duration::from_secs(30);

    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration, rate_limit_cooldown: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            rate_limit_cooldown,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32, error: &ProviderError) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let mut delay = self.backoff.saturating_mul(factor).min(Self::MAX_DELAY);
        if matches!(error, ProviderError::RateLimited) {
            delay += self.rate_limit_cooldown;
        }
        delay
    }
}

/// Outcome of a call made under a [`RetryPolicy`].
#[derive(Debug)]
#[must_use]
pub enum Attempted<T> {
    Success { value: T, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { error: ProviderError, attempts: u32 },
    /// A non-retryable error; no further attempts were made.
    Fatal { error: ProviderError, attempts: u32 },
}

impl<T> Attempted<T> {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Fatal { attempts, .. } => *attempts,
        }
    }

    /// # Errors
    ///
    /// Returns the last provider error when the call did not succeed.
    pub fn into_result(self) -> ProviderResult<T> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Exhausted { error, .. } | Self::Fatal { error, .. } => Err(error),
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or attempts run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                return Attempted::Success {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) if !error.is_retryable() => {
                return Attempted::Fatal {
                    error,
                    attempts: attempt,
                };
            }
            Err(error) if attempt >= max_attempts => {
                return Attempted::Exhausted {
                    error,
                    attempts: attempt,
                };
            }
            Err(error) => {
                let delay = policy.delay_after(attempt, &error);
                warn!(
                    call = label,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "{error}; retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
