// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Circuit breaker.
//!
//! The breaker tracks the outcomes of calls in a sliding window of `sampling_duration`.
//! Once the window holds at least `minimum_throughput` calls and the share of transient
//! failures reaches `failure_ratio`, the circuit opens and calls are rejected with
//! [`HttpError::CircuitOpen`](crate::HttpError::CircuitOpen) without reaching the transport.
//!
//! After `break_duration` the next call becomes the single trial call of a half-open
//! circuit. A successful trial closes the circuit with an empty window; a failed trial
//! opens it for another `break_duration`. Other calls are rejected while the trial runs.
//!
//! The standard pipeline keeps one circuit per request authority, up to 1024 of them;
//! requests to authorities beyond that share the destination's circuit. Custom pipelines
//! keep a single circuit per destination.
//!
//! Transitions are reported to a [`CircuitEventSink`]; the default sink writes them as
//! `tracing` events.

mod engine;
mod events;
mod health;
mod service;

pub use events::{CircuitClosed, CircuitEventSink, CircuitHalfOpened, CircuitOpened, TracingCircuitSink};
pub(crate) use health::{ExecutionResult, FailureWindow, WindowSnapshot};
pub(crate) use service::{CircuitBreakerLayer, Engines};

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CircuitState {
    /// Calls flow to the transport and their outcomes are sampled.
    Closed,
    /// Calls are rejected until the break duration elapses.
    Open,
    /// A single trial call decides whether the circuit closes again.
    HalfOpen,
}

impl CircuitState {
    /// The state name used in telemetry.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}
