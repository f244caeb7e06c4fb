// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-call deadline.
//!
//! The timeout stage races the inner call against a delay on the pipeline's clock. When the
//! delay wins, the inner call is dropped, which cancels it and every stage below it, and the
//! caller receives [`HttpError::Timeout`](crate::HttpError::Timeout). Timeouts are transient,
//! so a retry stage placed outside the timeout re-issues the call under a fresh deadline.

mod service;

pub(crate) use service::TimeoutLayer;
