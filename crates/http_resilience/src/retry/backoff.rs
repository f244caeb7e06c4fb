// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::options::{Backoff, RetryOptions};

/// Produces the delay before each retry of a call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DelayBackoff {
    backoff: Backoff,
    base_delay: Duration,
    max_delay: Duration,
}

impl From<&RetryOptions> for DelayBackoff {
    fn from(options: &RetryOptions) -> Self {
        Self {
            backoff: options.backoff,
            base_delay: options.base_delay,
            max_delay: options.max_delay,
        }
    }
}

impl DelayBackoff {
    /// Infinite sequence of delays; the first item is the delay before the first retry.
    pub fn delays(self) -> impl Iterator<Item = Duration> {
        (0_u32..).map(move |retry| self.delay(retry))
    }

    /// Delay before the retry with the given zero-based index, capped at the maximum delay.
    pub fn delay(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let delay = match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry.saturating_add(1)),
            Backoff::Exponential => 2_u32
                .checked_pow(retry)
                .and_then(|factor| self.base_delay.checked_mul(factor))
                .unwrap_or(Duration::MAX),
        };

        delay.min(self.max_delay)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn backoff(backoff: Backoff, base_secs: u64, max_secs: u64) -> DelayBackoff {
        DelayBackoff::from(&RetryOptions {
            max_retry_attempts: 3,
            base_delay: Duration::from_secs(base_secs),
            max_delay: Duration::from_secs(max_secs),
            backoff,
        })
    }

    fn first_secs(backoff: DelayBackoff, count: usize) -> Vec<u64> {
        backoff.delays().take(count).map(|d| d.as_secs()).collect()
    }

    #[rstest]
    #[case(Backoff::Exponential, vec![5, 10, 20, 40, 60, 60])]
    #[case(Backoff::Linear, vec![5, 10, 15, 20, 25, 30])]
    #[case(Backoff::Constant, vec![5, 5, 5, 5, 5, 5])]
    fn delays_capped_at_max(#[case] kind: Backoff, #[case] expected: Vec<u64>) {
        assert_eq!(first_secs(backoff(kind, 5, 60), 6), expected);
    }

    #[test]
    fn default_schedule() {
        assert_eq!(first_secs(DelayBackoff::from(&RetryOptions::default()), 3), [5, 10, 20]);
    }

    #[test]
    fn zero_base_delay_never_waits() {
        assert!(backoff(Backoff::Exponential, 0, 60).delays().take(40).all(|d| d.is_zero()));
    }

    #[test]
    fn huge_exponent_saturates_to_max() {
        let backoff = backoff(Backoff::Exponential, 5, 60);

        assert_eq!(backoff.delay(31), Duration::from_secs(60));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn zero_max_delay_caps_everything() {
        assert_eq!(first_secs(backoff(Backoff::Linear, 5, 0), 3), [0, 0, 0]);
    }
}
