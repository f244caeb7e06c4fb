// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Concurrency admission control.
//!
//! The limiter holds a pool of `permit_limit` permits. A call that finds a free permit runs
//! immediately; otherwise it waits in a queue of at most `queue_limit` callers, admitted
//! oldest-first or newest-first. A call that finds the queue full is rejected at once with
//! [`HttpError::Overloaded`](crate::HttpError::Overloaded), which is never retried.
//!
//! Every admitted call holds a `ConcurrencyToken` until it finishes, and the token returns
//! its permit when dropped. Cancelling a call, whether it is queued or already running,
//! therefore never leaks a permit.

mod permits;
mod service;

pub(crate) use permits::PermitPool;
pub(crate) use service::ConcurrencyLimiterLayer;
