// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retries with backoff.
//!
//! The retry stage re-issues a call whose outcome [`classify`](crate::classify) reports as
//! transient: a transport failure, a timeout or a `500 Internal Server Error` response. Any
//! other outcome, including the local `Overloaded` and `CircuitOpen` rejections, is returned
//! unchanged after the first attempt.
//!
//! `max_retry_attempts` counts retries, so the default of 3 allows four attempts in total.
//! Retry `n` (zero-based) waits
//!
//! - `base_delay` for [`Backoff::Constant`](crate::options::Backoff::Constant),
//! - `base_delay * (n + 1)` for [`Backoff::Linear`](crate::options::Backoff::Linear),
//! - `base_delay * 2^n` for [`Backoff::Exponential`](crate::options::Backoff::Exponential),
//!
//! capped at `max_delay`. Waiting is a delay on the pipeline's clock; dropping the call while
//! it waits cancels the wait.

mod attempt;
mod backoff;
mod service;

pub(crate) use attempt::Attempt;
pub(crate) use backoff::DelayBackoff;
pub(crate) use service::RetryLayer;
