//! Retry with exponential backoff.
//!
//! An operation is attempted up to `max_retries + 1` times. After a failed
//! attempt with zero-based index `k`, the caller is suspended for
//! `base_delay * 2^k` before the next attempt. There is no jitter, and unless
//! `max_delay` is set there is no cap on the delay.
//!
//! Classifying a failure is the operation's job:
//! - `Ok(value)` ends the loop. With `T = Option<U>`, `Ok(None)` is the
//!   "terminal, no data" result (e.g. an HTTP 4xx) and is never retried.
//! - `Err(AttemptError::Retryable(e))` backs off and tries again.
//! - `Err(AttemptError::Fatal(e))` stops immediately.
//!
//! When every attempt fails, the error of the last attempt is returned as-is.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default retry configuration
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt)
    pub base_delay: Duration,
    /// Optional ceiling for a single delay. `None` means unbounded growth.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with an uncapped backoff
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: None,
        }
    }

    /// Cap every individual delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Total number of times the operation may run
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay inserted after the failed attempt with index `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Exponential backoff: base_delay * 2^attempt
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Progress report handed to the `on_retry` hook before each backoff sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryNotice {
    /// 1-based number of the retry about to happen
    pub attempt: u32,
    pub max_retries: u32,
    /// How long the executor will sleep before that retry
    pub wait: Duration,
}

/// Failure of a single attempt, as classified by the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// Transient failure: back off and try again
    Retryable(E),
    /// Permanent failure: give up without further attempts
    Fatal(E),
}

impl<E> AttemptError<E> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Retryable(e) | Self::Fatal(e) => e,
        }
    }
}

/// Synchronous observer invoked before each backoff delay.
pub type RetryHook = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

/// Runs async operations under a [`RetryPolicy`].
#[derive(Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    on_retry: Option<RetryHook>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// Register a hook called with each [`RetryNotice`].
    ///
    /// The hook only observes; it cannot change whether or when the next
    /// attempt happens.
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryNotice) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation, treating every error as retryable.
    ///
    /// # Errors
    /// Returns the error of the final attempt once all retries are spent.
    ///
    /// # Example
    /// ```ignore
    /// let body = RetryExecutor::new(RetryPolicy::default())
    ///     .execute(|| async { client.get(url).send().await })
    ///     .await?;
    /// ```
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_classified(|| {
            let attempt = operation();
            async move { attempt.await.map_err(AttemptError::Retryable) }
        })
        .await
    }

    /// Execute an operation that classifies its own failures.
    ///
    /// # Errors
    /// Returns the inner error of a [`AttemptError::Fatal`] immediately, or the
    /// error of the final attempt once all retries are spent.
    pub async fn execute_classified<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        E: fmt::Display,
    {
        let max_retries = self.policy.max_retries;
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(AttemptError::Fatal(e)) => {
                    tracing::debug!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                    return Err(e);
                }
                Err(AttemptError::Retryable(e)) => {
                    if attempt >= max_retries {
                        tracing::error!(
                            "All {} attempts exhausted, last error: {}",
                            self.policy.total_attempts(),
                            e
                        );
                        return Err(e);
                    }

                    let wait = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Retryable error on attempt {} of {}: {}; retrying in {:?}",
                        attempt + 1,
                        self.policy.total_attempts(),
                        e,
                        wait
                    );

                    if let Some(hook) = &self.on_retry {
                        hook(&RetryNotice {
                            attempt: attempt + 1,
                            max_retries,
                            wait,
                        });
                    }

                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Execute an operation with retry logic and no observer.
///
/// # Errors
/// Same as [`RetryExecutor::execute`].
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    RetryExecutor::new(policy).execute(operation).await
}
