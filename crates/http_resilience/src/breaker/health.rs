// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const BUCKET_COUNT: u32 = 10;

/// Whether a call counts as a failure for the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionResult {
    Success,
    Failure,
}

/// Totals of the outcomes currently inside the window.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WindowSnapshot {
    throughput: u32,
    failure_ratio: f64,
}

impl WindowSnapshot {
    fn new(successes: u32, failures: u32) -> Self {
        let throughput = successes.saturating_add(failures);
        let failure_ratio = if throughput == 0 {
            0.0
        } else {
            f64::from(failures) / f64::from(throughput)
        };

        Self {
            throughput,
            failure_ratio,
        }
    }

    pub fn throughput(&self) -> u32 {
        self.throughput
    }

    pub fn failure_ratio(&self) -> f64 {
        self.failure_ratio
    }

    /// Whether enough calls were sampled and enough of them failed to open the circuit.
    pub fn is_unhealthy(&self, failure_threshold: f64, minimum_throughput: u32) -> bool {
        self.throughput >= minimum_throughput && self.failure_ratio >= failure_threshold
    }
}

/// Rolling window of call outcomes over the sampling duration.
///
/// The window is split into ten buckets; whole buckets fall out of the window once they are
/// older than the sampling duration.
#[derive(Debug)]
pub(crate) struct FailureWindow {
    sampling_duration: Duration,
    bucket_duration: Duration,
    buckets: VecDeque<Bucket>,
}

impl FailureWindow {
    pub fn new(sampling_duration: Duration) -> Self {
        Self {
            sampling_duration,
            bucket_duration: sampling_duration / BUCKET_COUNT,
            buckets: VecDeque::with_capacity(BUCKET_COUNT as usize),
        }
    }

    pub fn record(&mut self, result: ExecutionResult, now: Instant) {
        self.evict(now);

        if let Some(current) = self.buckets.back_mut()
            && now.saturating_duration_since(current.started_at) < self.bucket_duration
        {
            current.record(result);
            return;
        }

        let mut bucket = Bucket::new(now);
        bucket.record(result);
        self.buckets.push_back(bucket);
    }

    pub fn snapshot(&mut self, now: Instant) -> WindowSnapshot {
        self.evict(now);

        let (successes, failures) = self.buckets.iter().fold((0_u32, 0_u32), |(s, f), bucket| {
            (s.saturating_add(bucket.successes), f.saturating_add(bucket.failures))
        });

        WindowSnapshot::new(successes, failures)
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.buckets.front()
            && now.saturating_duration_since(oldest.started_at) >= self.sampling_duration
        {
            self.buckets.pop_front();
        }
    }
}

#[derive(Debug)]
struct Bucket {
    successes: u32,
    failures: u32,
    started_at: Instant,
}

impl Bucket {
    fn new(started_at: Instant) -> Self {
        Self {
            successes: 0,
            failures: 0,
            started_at,
        }
    }

    fn record(&mut self, result: ExecutionResult) {
        match result {
            ExecutionResult::Success => self.successes = self.successes.saturating_add(1),
            ExecutionResult::Failure => self.failures = self.failures.saturating_add(1),
        }
    }
}
