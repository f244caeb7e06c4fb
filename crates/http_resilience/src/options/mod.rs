// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Destination profiles and typed stage options.
//!
//! Configuration arrives as a [`DestinationProfile`]: a name, a base address and either the
//! standard pipeline or an ordered list of [`PolicySpec`] entries whose parameters are plain
//! strings. [`resolve`] turns one policy entry into typed [`StageOptions`], applying the
//! defaults below for absent keys and rejecting present keys that cannot be used.
//!
//! | Policy | Parameter | Default |
//! |---|---|---|
//! | `Timeout` | `TimeoutInSeconds` | 10 |
//! | `ConcurrencyLimiter` | `MaxConcurrentCalls` | 100 |
//! | `ConcurrencyLimiter` | `QueueLimit` | `i32::MAX` |
//! | `ConcurrencyLimiter` | `QueueProcessingOrder` | `OldestFirst` |
//! | `Retry` | `MaxAttempts` | 3 |
//! | `Retry` | `DelayInSeconds` | 5 |
//! | `Retry` | `MaxDelayInSeconds` | 60 |
//! | `Retry` | `BackoffType` | `Exponential` |
//! | `CircuitBreaker` | `DurationInSeconds` | 60 |
//! | `CircuitBreaker` | `SamplingDurationInSeconds` | 120 |
//! | `CircuitBreaker` | `FailureRatio` (percent) | 100 |
//! | `CircuitBreaker` | `MinimumThroughput` | 10 |
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use http_resilience::options::{PolicyKind, PolicySpec, StageOptions, resolve};
//!
//! let spec = PolicySpec::new(PolicyKind::Timeout).parameter("TimeoutInSeconds", "3");
//! let options = resolve(spec.policy(), spec.parameters())?;
//!
//! let StageOptions::Timeout(timeout) = options else { unreachable!() };
//! assert_eq!(timeout.timeout, Duration::from_secs(3));
//! # Ok::<(), http_resilience::ConfigError>(())
//! ```

pub(crate) mod constants;
mod profile;
mod resolve;

use std::time::Duration;

pub use profile::{DestinationProfile, PolicyKind, PolicySpec};
pub use resolve::{resolve, resolve_profile, standard_pipeline};

use constants::*;

/// Per-attempt deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutOptions {
    /// How long a single call may take before it is cancelled.
    pub timeout: Duration,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

/// Order in which queued calls obtain a released permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOrder {
    /// The call that has waited longest goes first.
    OldestFirst,
    /// The most recently queued call goes first. When the queue is full, the oldest waiter
    /// is rejected to make room for the new call.
    NewestFirst,
}

/// Bounds the number of calls in flight against one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimiterOptions {
    /// Calls allowed in flight at once.
    pub permit_limit: usize,
    /// Calls allowed to wait for a permit. Zero rejects every call that finds no free permit.
    pub queue_limit: usize,
    /// Order in which waiting calls are admitted.
    pub queue_order: QueueOrder,
}

impl Default for ConcurrencyLimiterOptions {
    fn default() -> Self {
        Self {
            permit_limit: DEFAULT_PERMIT_LIMIT,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            queue_order: DEFAULT_QUEUE_ORDER,
        }
    }
}

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backoff {
    /// Every retry waits the base delay.
    ///
    /// **Example with `5s` base delay:** `5s, 5s, 5s, ...`
    Constant,

    /// The delay grows by the base delay with every retry.
    ///
    /// **Example with `5s` base delay:** `5s, 10s, 15s, ...`
    Linear,

    /// The delay doubles with every retry.
    ///
    /// **Example with `5s` base delay:** `5s, 10s, 20s, 40s, ...`
    Exponential,
}

/// Re-issues calls that ended with a transient outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Retries allowed after the initial call.
    pub max_retry_attempts: u32,
    /// Base delay of the backoff schedule.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// How the delay grows between retries.
    pub backoff: Backoff,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Short-circuits calls while a destination is failing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerOptions {
    /// How long the circuit stays open before a trial call is let through.
    pub break_duration: Duration,
    /// Length of the rolling window outcomes are sampled over.
    pub sampling_duration: Duration,
    /// Failure ratio, as a fraction in `[0, 1]`, at or above which the circuit opens.
    pub failure_ratio: f64,
    /// Sampled calls required before the failure ratio is considered.
    pub minimum_throughput: u32,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            break_duration: DEFAULT_BREAK_DURATION,
            sampling_duration: DEFAULT_SAMPLING_DURATION,
            failure_ratio: DEFAULT_FAILURE_RATIO,
            minimum_throughput: DEFAULT_MINIMUM_THROUGHPUT,
        }
    }
}

/// Effective, validated options of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageOptions {
    /// Options of a timeout stage.
    Timeout(TimeoutOptions),
    /// Options of a retry stage.
    Retry(RetryOptions),
    /// Options of a circuit breaker stage.
    CircuitBreaker(CircuitBreakerOptions),
    /// Options of a concurrency limiter stage.
    ConcurrencyLimiter(ConcurrencyLimiterOptions),
}

impl StageOptions {
    /// The policy these options configure.
    #[must_use]
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Timeout(_) => PolicyKind::Timeout,
            Self::Retry(_) => PolicyKind::Retry,
            Self::CircuitBreaker(_) => PolicyKind::CircuitBreaker,
            Self::ConcurrencyLimiter(_) => PolicyKind::ConcurrencyLimiter,
        }
    }
}

impl From<TimeoutOptions> for StageOptions {
    fn from(options: TimeoutOptions) -> Self {
        Self::Timeout(options)
    }
}

impl From<RetryOptions> for StageOptions {
    fn from(options: RetryOptions) -> Self {
        Self::Retry(options)
    }
}

impl From<CircuitBreakerOptions> for StageOptions {
    fn from(options: CircuitBreakerOptions) -> Self {
        Self::CircuitBreaker(options)
    }
}

impl From<ConcurrencyLimiterOptions> for StageOptions {
    fn from(options: ConcurrencyLimiterOptions) -> Self {
        Self::ConcurrencyLimiter(options)
    }
}
