// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::time::Duration;

use super::CircuitState;

/// Receives circuit state transitions of every destination.
///
/// Calls are made synchronously by the call that caused the transition, after the breaker
/// released its internal lock, so a sink may do anything except block for long.
pub trait CircuitEventSink: Debug + Send + Sync {
    /// The circuit moved from half-open back to closed: the trial call succeeded.
    fn on_circuit_closed(&self, event: CircuitClosed<'_>);

    /// The break duration elapsed and the circuit lets a single trial call through.
    fn on_circuit_half_opened(&self, event: CircuitHalfOpened<'_>);

    /// The circuit opened, either from closed or because a trial call failed.
    fn on_circuit_opened(&self, event: CircuitOpened<'_>) {
        _ = event;
    }
}

/// A circuit opened.
#[derive(Debug)]
#[non_exhaustive]
pub struct CircuitOpened<'a> {
    pub(crate) destination: &'a str,
    pub(crate) partition: &'a str,
    pub(crate) cause: &'a str,
    pub(crate) break_duration: Duration,
    pub(crate) throughput: Option<u32>,
    pub(crate) failure_ratio: Option<f64>,
}

impl CircuitOpened<'_> {
    /// Name of the destination.
    #[must_use]
    pub fn destination(&self) -> &str {
        self.destination
    }

    /// The authority whose circuit opened, or the destination name when the circuit is
    /// shared by every authority.
    #[must_use]
    pub fn partition(&self) -> &str {
        self.partition
    }

    /// The failure that opened the circuit.
    #[must_use]
    pub fn cause(&self) -> &str {
        self.cause
    }

    /// How long calls will be rejected.
    #[must_use]
    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// Calls sampled when the circuit opened from closed; `None` for a failed trial.
    #[must_use]
    pub fn throughput(&self) -> Option<u32> {
        self.throughput
    }

    /// Failure ratio when the circuit opened from closed; `None` for a failed trial.
    #[must_use]
    pub fn failure_ratio(&self) -> Option<f64> {
        self.failure_ratio
    }
}

/// A circuit became half-open.
#[derive(Debug)]
#[non_exhaustive]
pub struct CircuitHalfOpened<'a> {
    pub(crate) destination: &'a str,
    pub(crate) partition: &'a str,
}

impl CircuitHalfOpened<'_> {
    /// Name of the destination.
    #[must_use]
    pub fn destination(&self) -> &str {
        self.destination
    }

    /// The authority whose circuit is half-open.
    #[must_use]
    pub fn partition(&self) -> &str {
        self.partition
    }
}

/// A circuit closed after a successful trial call.
#[derive(Debug)]
#[non_exhaustive]
pub struct CircuitClosed<'a> {
    pub(crate) destination: &'a str,
    pub(crate) partition: &'a str,
    pub(crate) cause: Option<&'a str>,
    pub(crate) open_duration: Duration,
}

impl CircuitClosed<'_> {
    /// Name of the destination.
    #[must_use]
    pub fn destination(&self) -> &str {
        self.destination
    }

    /// The authority whose circuit closed.
    #[must_use]
    pub fn partition(&self) -> &str {
        self.partition
    }

    /// The failure that originally opened the circuit.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause
    }

    /// How long the circuit was not closed.
    #[must_use]
    pub fn open_duration(&self) -> Duration {
        self.open_duration
    }
}

/// Writes circuit transitions as `tracing` events.
///
/// Opening and closing are logged at `WARN`, the closing event carrying the failure that
/// opened the circuit. Becoming half-open is logged at `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCircuitSink;

impl CircuitEventSink for TracingCircuitSink {
    fn on_circuit_closed(&self, event: CircuitClosed<'_>) {
        tracing::event!(
            name: "http_resilience.circuit.closed",
            tracing::Level::WARN,
            destination.name = event.destination,
            strategy.name = "circuit_breaker",
            circuit_breaker.partition = event.partition,
            circuit_breaker.state = CircuitState::Closed.as_str(),
            circuit_breaker.open_duration = event.open_duration.as_secs_f32(),
            circuit_breaker.cause = event.cause.unwrap_or_default(),
        );
    }

    fn on_circuit_half_opened(&self, event: CircuitHalfOpened<'_>) {
        tracing::event!(
            name: "http_resilience.circuit.half_opened",
            tracing::Level::INFO,
            destination.name = event.destination,
            strategy.name = "circuit_breaker",
            circuit_breaker.partition = event.partition,
            circuit_breaker.state = CircuitState::HalfOpen.as_str(),
        );
    }

    fn on_circuit_opened(&self, event: CircuitOpened<'_>) {
        tracing::event!(
            name: "http_resilience.circuit.opened",
            tracing::Level::WARN,
            destination.name = event.destination,
            strategy.name = "circuit_breaker",
            circuit_breaker.partition = event.partition,
            circuit_breaker.state = CircuitState::Open.as_str(),
            circuit_breaker.break_duration = event.break_duration.as_secs_f32(),
            circuit_breaker.health.throughput = event.throughput,
            circuit_breaker.health.failure_ratio = event.failure_ratio,
            circuit_breaker.cause = event.cause,
        );
    }
}
