// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use super::constants::*;
use super::{
    Backoff, CircuitBreakerOptions, ConcurrencyLimiterOptions, DestinationProfile, PolicyKind, QueueOrder, RetryOptions,
    StageOptions, TimeoutOptions,
};
use crate::ConfigError;

/// Resolves the raw parameters of one policy into typed options.
///
/// Absent keys take their documented default and unrecognized keys are ignored. A key that
/// is present but malformed or out of range is an error, so misconfiguration surfaces when
/// destinations are registered rather than when calls are made.
///
/// Integers accept surrounding whitespace and a sign. Enumerations accept the member name
/// or its ordinal (`OldestFirst` = 0, `NewestFirst` = 1; `Constant` = 0, `Linear` = 1,
/// `Exponential` = 2). Durations are whole seconds of at most one day. `FailureRatio` is a
/// percentage in `[0, 100]`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidParameter`] for the first unusable parameter.
pub fn resolve(policy: PolicyKind, parameters: &BTreeMap<String, String>) -> Result<StageOptions, ConfigError> {
    let parameters = Parameters { policy, parameters };

    let options = match policy {
        PolicyKind::Timeout => StageOptions::Timeout(TimeoutOptions {
            timeout: parameters.seconds(TIMEOUT_IN_SECONDS, DEFAULT_TIMEOUT, 1, MAX_CONFIGURED_DURATION)?,
        }),
        PolicyKind::ConcurrencyLimiter => StageOptions::ConcurrencyLimiter(ConcurrencyLimiterOptions {
            permit_limit: parameters.count(MAX_CONCURRENT_CALLS, DEFAULT_PERMIT_LIMIT, 1)?,
            queue_limit: parameters.count(QUEUE_LIMIT, DEFAULT_QUEUE_LIMIT, 0)?,
            queue_order: parameters.choice(
                QUEUE_PROCESSING_ORDER,
                DEFAULT_QUEUE_ORDER,
                &[("OldestFirst", QueueOrder::OldestFirst), ("NewestFirst", QueueOrder::NewestFirst)],
            )?,
        }),
        PolicyKind::Retry => StageOptions::Retry(RetryOptions {
            max_retry_attempts: parameters.count(MAX_ATTEMPTS, DEFAULT_MAX_RETRY_ATTEMPTS, 1)?,
            base_delay: parameters.seconds(DELAY_IN_SECONDS, DEFAULT_RETRY_DELAY, 0, MAX_CONFIGURED_DURATION)?,
            max_delay: parameters.seconds(MAX_DELAY_IN_SECONDS, DEFAULT_MAX_RETRY_DELAY, 0, MAX_CONFIGURED_DURATION)?,
            backoff: parameters.choice(
                BACKOFF_TYPE,
                DEFAULT_BACKOFF,
                &[
                    ("Constant", Backoff::Constant),
                    ("Linear", Backoff::Linear),
                    ("Exponential", Backoff::Exponential),
                ],
            )?,
        }),
        PolicyKind::CircuitBreaker => StageOptions::CircuitBreaker(CircuitBreakerOptions {
            break_duration: parameters.seconds(DURATION_IN_SECONDS, DEFAULT_BREAK_DURATION, 1, MAX_CONFIGURED_DURATION)?,
            sampling_duration: parameters.seconds(SAMPLING_DURATION_IN_SECONDS, DEFAULT_SAMPLING_DURATION, 1, MAX_CONFIGURED_DURATION)?,
            failure_ratio: parameters.percentage(FAILURE_RATIO, DEFAULT_FAILURE_RATIO)?,
            minimum_throughput: parameters.count(MINIMUM_THROUGHPUT, DEFAULT_MINIMUM_THROUGHPUT, 2)?,
        }),
    };

    Ok(options)
}

/// Options of the standard pipeline, outermost stage first.
#[must_use]
pub fn standard_pipeline() -> Vec<StageOptions> {
    vec![
        TimeoutOptions::default().into(),
        RetryOptions::default().into(),
        CircuitBreakerOptions::default().into(),
        ConcurrencyLimiterOptions::default().into(),
    ]
}

/// Resolves every stage of a destination, outermost stage first.
///
/// # Errors
///
/// Returns the first error produced by [`resolve`].
pub fn resolve_profile(profile: &DestinationProfile) -> Result<Vec<StageOptions>, ConfigError> {
    if profile.use_standard_resilience_pipeline() {
        return Ok(standard_pipeline());
    }

    profile
        .custom_resilience_pipeline()
        .iter()
        .map(|spec| resolve(spec.policy(), spec.parameters()))
        .collect()
}

struct Parameters<'a> {
    policy: PolicyKind,
    parameters: &'a BTreeMap<String, String>,
}

impl Parameters<'_> {
    fn integer(&self, key: &'static str, min: i64) -> Result<Option<i64>, ConfigError> {
        let Some(raw) = self.parameters.get(key) else {
            return Ok(None);
        };

        let value = raw
            .trim()
            .parse::<i64>()
            .map_err(|e| self.invalid(key, raw, format!("not an integer ({e})")))?;

        if value < min {
            return Err(self.invalid(key, raw, format!("must be at least {min}")));
        }

        Ok(Some(value))
    }

    fn count<T>(&self, key: &'static str, default: T, min: i64) -> Result<T, ConfigError>
    where
        T: TryFrom<i64>,
        T::Error: Display,
    {
        match self.integer(key, min)? {
            None => Ok(default),
            Some(value) => T::try_from(value).map_err(|e| self.invalid(key, &self.raw(key), e.to_string())),
        }
    }

    fn seconds(&self, key: &'static str, default: Duration, min: i64, max: Duration) -> Result<Duration, ConfigError> {
        let value = self.count(key, default.as_secs(), min).map(Duration::from_secs)?;

        if value > max {
            return Err(self.invalid(key, &self.raw(key), format!("must be at most {} seconds", max.as_secs())));
        }

        Ok(value)
    }

    fn percentage(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let Some(raw) = self.parameters.get(key) else {
            return Ok(default);
        };

        let percent = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| self.invalid(key, raw, format!("not a number ({e})")))?;

        if !(0.0..=100.0).contains(&percent) {
            return Err(self.invalid(key, raw, "must be between 0 and 100"));
        }

        Ok(percent / 100.0)
    }

    fn choice<T: Copy>(&self, key: &'static str, default: T, members: &[(&str, T)]) -> Result<T, ConfigError> {
        let Some(raw) = self.parameters.get(key) else {
            return Ok(default);
        };

        let trimmed = raw.trim();
        if let Some((_, member)) = members.iter().find(|(name, _)| *name == trimmed) {
            return Ok(*member);
        }

        trimmed
            .parse::<usize>()
            .ok()
            .and_then(|ordinal| members.get(ordinal))
            .map(|(_, member)| *member)
            .ok_or_else(|| {
                let names: Vec<&str> = members.iter().map(|(name, _)| *name).collect();
                self.invalid(key, raw, format!("expected one of {}", names.join(", ")))
            })
    }

    fn raw(&self, key: &str) -> String {
        self.parameters.get(key).cloned().unwrap_or_default()
    }

    fn invalid(&self, key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidParameter {
            policy: self.policy,
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
