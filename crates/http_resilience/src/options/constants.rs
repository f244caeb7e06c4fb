// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{Backoff, QueueOrder};

/// Default per-attempt timeout: 10 seconds.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of calls allowed in flight at once.
pub(crate) const DEFAULT_PERMIT_LIMIT: usize = 100;

/// Default queue bound: effectively unbounded (`i32::MAX` waiters).
pub(crate) const DEFAULT_QUEUE_LIMIT: usize = 2_147_483_647;

pub(crate) const DEFAULT_QUEUE_ORDER: QueueOrder = QueueOrder::OldestFirst;

/// Default number of retries after the initial call: 3.
///
/// A call therefore reaches the transport at most four times.
pub(crate) const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay of the backoff schedule: 5 seconds.
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for a single retry delay: 60 seconds.
pub(crate) const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Default backoff: exponential, doubling the base delay per retry.
pub(crate) const DEFAULT_BACKOFF: Backoff = Backoff::Exponential;

/// How long an opened circuit rejects calls before letting a trial through: 60 seconds.
pub(crate) const DEFAULT_BREAK_DURATION: Duration = Duration::from_secs(60);

/// Length of the rolling window the failure ratio is computed over: 120 seconds.
pub(crate) const DEFAULT_SAMPLING_DURATION: Duration = Duration::from_secs(120);

/// Default failure ratio, as a fraction: the circuit opens only when every sampled call failed.
pub(crate) const DEFAULT_FAILURE_RATIO: f64 = 1.0;

/// Minimum number of sampled calls before the failure ratio is considered.
pub(crate) const DEFAULT_MINIMUM_THROUGHPUT: u32 = 10;

/// Upper bound for every configured duration: one day.
pub(crate) const MAX_CONFIGURED_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) const TIMEOUT_IN_SECONDS: &str = "TimeoutInSeconds";
pub(crate) const MAX_CONCURRENT_CALLS: &str = "MaxConcurrentCalls";
pub(crate) const QUEUE_LIMIT: &str = "QueueLimit";
pub(crate) const QUEUE_PROCESSING_ORDER: &str = "QueueProcessingOrder";
pub(crate) const MAX_ATTEMPTS: &str = "MaxAttempts";
pub(crate) const DELAY_IN_SECONDS: &str = "DelayInSeconds";
pub(crate) const MAX_DELAY_IN_SECONDS: &str = "MaxDelayInSeconds";
pub(crate) const BACKOFF_TYPE: &str = "BackoffType";
pub(crate) const DURATION_IN_SECONDS: &str = "DurationInSeconds";
pub(crate) const SAMPLING_DURATION_IN_SECONDS: &str = "SamplingDurationInSeconds";
pub(crate) const FAILURE_RATIO: &str = "FailureRatio";
pub(crate) const MINIMUM_THROUGHPUT: &str = "MinimumThroughput";
