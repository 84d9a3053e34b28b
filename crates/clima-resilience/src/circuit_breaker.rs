//! Circuit breaker guarding a single downstream dependency.
//!
//! # States
//! ```text
//! Closed   → Open:     failures >= failure_threshold
//! Open     → HalfOpen: cooldown elapsed since opening (unconditional)
//! HalfOpen → Closed:   a call succeeds
//! HalfOpen → Open:     a call fails (the failure count was never reset)
//! ```
//!
//! HalfOpen admits calls exactly like Closed. Nothing limits how many trial
//! calls pass through before one of them resolves the state.
//!
//! The Open → HalfOpen transition is evaluated whenever the breaker is
//! observed, against `tokio::time::Instant`. It therefore happens at the same
//! moment a one-shot timer would fire, without a background task.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_COOLDOWN_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Dependency assumed down - requests fail fast
    Open,
    /// Cooldown elapsed - requests pass through as trials
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Time spent Open before trial calls are admitted
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, cooldown_ms: u64) -> Self {
        Self {
            failure_threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }
}

/// Returned instead of running the request while the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Circuit is open, service is unavailable")]
pub struct CircuitOpenError;

/// Error surfaced by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The request was rejected without being run
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The request ran and failed; the error is the request's own
    #[error("{0}")]
    Request(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The request's error, or `None` when the call was fast-failed
    pub fn into_request_error(self) -> Option<E> {
        match self {
            Self::Open(_) => None,
            Self::Request(e) => Some(e),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Fails fast after repeated failures of one dependency.
///
/// Construct one per protected dependency and share it with `Arc`.
///
/// # Example
/// ```ignore
/// let breaker = CircuitBreaker::new("weather-api", BreakerConfig::default());
/// let result = breaker
///     .execute(|| retry.execute_classified(|| attempt()))
///     .await;
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, with the cooldown taken into account.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.observe(&mut inner)
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Run `request` unless the circuit is open.
    ///
    /// # Errors
    /// [`BreakerError::Open`] when fast-failing, otherwise
    /// [`BreakerError::Request`] carrying the request's own error.
    pub async fn execute<T, E, F, Fut>(&self, request: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match request().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Request(e))
            }
        }
    }

    /// Check whether a call may proceed right now.
    ///
    /// # Errors
    /// [`CircuitOpenError`] while the circuit is open.
    pub fn admit(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock();
        if self.observe(&mut inner) == CircuitState::Open {
            tracing::debug!(breaker = %self.name, "Circuit open, rejecting call");
            return Err(CircuitOpenError);
        }
        Ok(())
    }

    /// Record a successful call: close the circuit and clear the failure count.
    ///
    /// A success reported while Open comes from a call admitted before the
    /// circuit opened; it does not shorten the cooldown.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match self.observe(&mut inner) {
            CircuitState::Open => {
                tracing::debug!(breaker = %self.name, "Ignoring late success while open");
            }
            previous => {
                if previous == CircuitState::HalfOpen {
                    tracing::info!(breaker = %self.name, "Trial call succeeded, circuit closed");
                }
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.opened_at = None;
            }
        }
    }

    /// Record a failed call, opening the circuit once the threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        if self.observe(&mut inner) == CircuitState::Open {
            tracing::debug!(breaker = %self.name, "Ignoring late failure while open");
            return;
        }

        inner.failures = inner.failures.saturating_add(1);
        if inner.failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failures,
                "Circuit opened for {:?}",
                self.config.cooldown
            );
        } else {
            tracing::debug!(
                breaker = %self.name,
                "Failure {} of {}",
                inner.failures,
                self.config.failure_threshold
            );
        }
    }

    /// Force the breaker back to Closed with no recorded failures.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    fn observe(&self, inner: &mut BreakerInner) -> CircuitState {
        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .opened_at
                .map_or(true, |opened_at| opened_at.elapsed() >= self.config.cooldown);
            if cooled_down {
                inner.state = CircuitState::HalfOpen;
                inner.opened_at = None;
                tracing::info!(breaker = %self.name, "Cooldown elapsed, circuit half-open");
            }
        }
        inner.state
    }
}
