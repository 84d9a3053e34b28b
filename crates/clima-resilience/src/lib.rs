//! Resilience primitives for outbound calls.
//!
//! - [`RetryExecutor`]: bounded retries with exponential backoff
//! - [`CircuitBreaker`]: fail fast while a dependency is unhealthy
//!
//! Compose them with the breaker outside and the retry inside, so a whole
//! retried sequence counts as one success or one failure against the breaker.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, CircuitBreaker, CircuitOpenError, CircuitState,
};
pub use retry::{with_retry, AttemptError, RetryExecutor, RetryHook, RetryNotice, RetryPolicy};
