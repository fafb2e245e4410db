//! Timeout-aware retry wrapper for external calls
//!
//! Each attempt races the call against a per-call timeout. A timeout and an
//! error count the same: the counter is bumped, and once it reaches
//! `max_retries` the last failure is returned. Otherwise the wrapper sleeps a
//! fixed backoff and tries again.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};

use crate::error::{InvokeError, ProviderError};

fn default_max_retries() -> u32 {
    3
}

fn default_per_call_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_backoff() -> Duration {
    Duration::from_secs(1)
}

/// Retry policy for provider calls
///
/// # Example
/// ```
/// use gridbench_core::recovery::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_per_call_timeout(Duration::from_secs(120));
/// assert_eq!(policy.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of calls before giving up (at least 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Limit on a single call
    #[serde(default = "default_per_call_timeout", with = "humantime_serde")]
    pub per_call_timeout: Duration,

    /// Fixed pause between calls
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            per_call_timeout: default_per_call_timeout(),
            backoff: default_backoff(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_per_call_timeout(mut self, per_call_timeout: Duration) -> Self {
        self.per_call_timeout = per_call_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Calls permitted, never less than one
    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Call `call` until it succeeds or the policy is exhausted
pub async fn invoke<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, InvokeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_retries = policy.effective_max_retries();
    let mut retry_count = 0;

    loop {
        let failure = match timeout(policy.per_call_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => {
                tracing::warn!(
                    attempt = retry_count + 1,
                    max_retries,
                    "Call failed: {}",
                    error
                );
                InvokeError::Failed {
                    attempts: retry_count + 1,
                    source: error,
                }
            }
            Err(_) => {
                tracing::warn!(
                    attempt = retry_count + 1,
                    max_retries,
                    "Call timed out after {:?}",
                    policy.per_call_timeout
                );
                InvokeError::Timeout {
                    attempts: retry_count + 1,
                    timeout: policy.per_call_timeout,
                }
            }
        };

        retry_count += 1;
        if retry_count >= max_retries {
            tracing::error!("Giving up after {} attempts", retry_count);
            return Err(failure);
        }

        sleep(policy.backoff).await;
    }
}
