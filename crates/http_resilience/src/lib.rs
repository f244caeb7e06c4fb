// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Named outbound HTTP clients with resilience pipelines.
//!
//! Each destination is registered once at startup from a [`DestinationProfile`]: a name, a
//! base address and a pipeline of resilience stages wrapped around a transport. Calls are
//! then made by destination name, or through a [`ResilientClient`] handle, and travel through
//! the stages outermost first.
//!
//! # Stages
//!
//! - **Timeout** cancels a single attempt that outlives its deadline and reports
//!   [`HttpError::Timeout`].
//! - **Retry** re-issues attempts whose outcome is transient, waiting with constant, linear
//!   or exponential backoff.
//! - **Circuit breaker** stops calling a destination whose recent calls mostly failed and
//!   rejects calls with [`HttpError::CircuitOpen`] until a trial call succeeds.
//! - **Concurrency limiter** bounds the calls in flight and rejects calls with
//!   [`HttpError::Overloaded`] once its queue is full.
//!
//! The standard pipeline is timeout, retry, circuit breaker and concurrency limiter with
//! default options. Custom pipelines list their stages explicitly; see [`options`] for the
//! parameters and their defaults.
//!
//! # Outcomes
//!
//! Every call ends with an [`HttpOutcome`]. Any HTTP response, whatever its status, is `Ok`.
//! [`classify`] decides which outcomes are transient: transport failures, timeouts and
//! `500 Internal Server Error` responses. Only those are retried and count as failures for
//! the circuit breaker.
//!
//! # Time
//!
//! All stages measure time with a [`tick::Clock`]. Applications pass a runtime clock, such as
//! `Clock::new_tokio()` with the `tokio` feature; tests drive time with `tick::ClockControl`.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use http::Uri;
//! use http_resilience::options::{DestinationProfile, PolicyKind, PolicySpec};
//! use http_resilience::{HttpOutcome, HttpRequest, HttpResponse, ResilientClients};
//! use layered::Execute;
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let transport = Execute::new(|_request: HttpRequest| async { HttpOutcome::Ok(HttpResponse::new(Bytes::new())) });
//!
//! let clients = ResilientClients::builder(Clock::new_frozen(), transport)
//!     .register_destination(
//!         DestinationProfile::new("inventory", Uri::from_static("https://inventory.example.com"))
//!             .policy(PolicySpec::new(PolicyKind::Retry).parameter("MaxAttempts", "2"))
//!             .policy(PolicySpec::new(PolicyKind::Timeout).parameter("TimeoutInSeconds", "5")),
//!     )?
//!     .build();
//!
//! let inventory = clients.client("inventory")?;
//! let response = inventory.execute(http::Request::get("/stock/42").body(Bytes::new())?).await?;
//! assert!(response.status().is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! # Circuit events
//!
//! Circuit transitions are reported to a [`CircuitEventSink`]. The default,
//! [`TracingCircuitSink`], writes them as `tracing` events; a custom sink is installed with
//! [`ResilientClientsBuilder::event_sink`].

mod breaker;
mod context;
mod error;
mod limiter;
mod message;
pub mod options;
mod pipeline;
mod retry;
mod timeout;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;

pub use breaker::{CircuitClosed, CircuitEventSink, CircuitHalfOpened, CircuitOpened, CircuitState, TracingCircuitSink};
pub use error::{BoxError, ConfigError, HttpError};
#[doc(inline)]
pub use layered::Service;
pub use message::{BoxedService, HttpOutcome, HttpRequest, HttpResponse, Transport, classify};
pub use options::DestinationProfile;
pub use pipeline::{ResilientClient, ResilientClients, ResilientClientsBuilder, destination_name};
#[doc(inline)]
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};
