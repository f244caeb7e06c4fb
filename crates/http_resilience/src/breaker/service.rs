// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;

use layered::{Layer, Service};
use parking_lot::Mutex;
use recoverable::RecoveryKind;
use tick::Clock;

use super::engine::{CircuitEngine, EnterCircuitResult, ExecutionMode, ExitCircuitResult};
use super::{CircuitClosed, CircuitEventSink, CircuitHalfOpened, CircuitOpened, CircuitState, ExecutionResult};
use crate::context::PipelineContext;
use crate::options::CircuitBreakerOptions;
use crate::{HttpError, HttpOutcome, HttpRequest, classify};

/// Most per-authority circuits a partitioned breaker keeps.
pub(crate) const MAX_PARTITIONS: usize = 1024;

/// Rejects calls to the inner service while its circuit is open.
#[derive(Debug)]
pub(crate) struct CircuitBreaker<S> {
    shared: Arc<BreakerShared>,
    inner: S,
}

#[derive(Debug)]
struct BreakerShared {
    engines: Arc<Engines>,
    destination: Arc<str>,
    sink: Arc<dyn CircuitEventSink>,
}

impl<S: Clone> Clone for CircuitBreaker<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<HttpRequest> for CircuitBreaker<S>
where
    S: Service<HttpRequest, Out = HttpOutcome>,
{
    type Out = HttpOutcome;

    async fn execute(&self, input: HttpRequest) -> Self::Out {
        let (partition, engine) = self.shared.engines.circuit_for(&input);

        let mode = match engine.enter() {
            EnterCircuitResult::Accepted { mode, half_opened } => {
                if half_opened {
                    self.shared.sink.on_circuit_half_opened(CircuitHalfOpened {
                        destination: &self.shared.destination,
                        partition: &partition,
                    });
                }
                mode
            }
            EnterCircuitResult::Rejected { retry_after } => {
                tracing::event!(
                    name: "http_resilience.circuit.rejected",
                    tracing::Level::WARN,
                    destination.name = %self.shared.destination,
                    strategy.name = "circuit_breaker",
                    circuit_breaker.partition = %partition,
                    circuit_breaker.state = CircuitState::Open.as_str(),
                );

                return Err(HttpError::CircuitOpen {
                    destination: Arc::clone(&self.shared.destination),
                    retry_after,
                });
            }
        };

        let mut guard = TrialGuard {
            engine: &engine,
            armed: mode == ExecutionMode::Trial,
        };
        let outcome = self.inner.execute(input).await;
        guard.armed = false;

        self.shared.record(&engine, &partition, mode, &outcome);
        outcome
    }
}

impl BreakerShared {
    fn record(&self, engine: &CircuitEngine, partition: &str, mode: ExecutionMode, outcome: &HttpOutcome) {
        let result = match outcome {
            // Rejections from inner stages say nothing about the health of the destination.
            Err(error) if error.is_rejection() => {
                if mode == ExecutionMode::Trial {
                    engine.abandon_trial();
                }
                return;
            }
            outcome if classify(outcome).kind() == RecoveryKind::Retry => ExecutionResult::Failure,
            _ => ExecutionResult::Success,
        };

        match engine.exit(result, mode, || describe_failure(outcome)) {
            ExitCircuitResult::Unchanged => {}
            ExitCircuitResult::Opened { snapshot, cause } => self.sink.on_circuit_opened(CircuitOpened {
                destination: &self.destination,
                partition,
                cause: &cause,
                break_duration: engine.break_duration(),
                throughput: Some(snapshot.throughput()),
                failure_ratio: Some(snapshot.failure_ratio()),
            }),
            ExitCircuitResult::Reopened { cause } => self.sink.on_circuit_opened(CircuitOpened {
                destination: &self.destination,
                partition,
                cause: &cause,
                break_duration: engine.break_duration(),
                throughput: None,
                failure_ratio: None,
            }),
            ExitCircuitResult::Closed { open_duration, cause } => self.sink.on_circuit_closed(CircuitClosed {
                destination: &self.destination,
                partition,
                cause: Some(&cause),
                open_duration,
            }),
        }
    }
}

fn describe_failure(outcome: &HttpOutcome) -> Arc<str> {
    match outcome {
        Ok(response) => Arc::from(format!("HTTP {}", response.status())),
        Err(error) => Arc::from(error.to_string()),
    }
}

/// Frees the half-open trial slot if the trial call is dropped before it completes.
struct TrialGuard<'a> {
    engine: &'a CircuitEngine,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.engine.abandon_trial();
        }
    }
}

/// Circuits of one breaker stage, keyed by partition.
///
/// A partitioned breaker keeps one circuit per request authority. An unpartitioned breaker
/// keeps a single circuit named after the destination.
#[derive(Debug)]
pub(crate) struct Engines {
    circuits: Mutex<HashMap<Arc<str>, Arc<CircuitEngine>>>,
    options: CircuitBreakerOptions,
    clock: Clock,
    destination: Arc<str>,
    partitioned: bool,
}

impl Engines {
    fn new(options: CircuitBreakerOptions, clock: Clock, destination: Arc<str>, partitioned: bool) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            options,
            clock,
            destination,
            partitioned,
        }
    }

    /// Circuit a request goes through, with the name of its partition.
    ///
    /// Partitioned breakers key circuits by request authority. Once [`MAX_PARTITIONS`]
    /// authorities have circuits, requests to further authorities share the destination's
    /// circuit.
    fn circuit_for(&self, request: &HttpRequest) -> (Arc<str>, Arc<CircuitEngine>) {
        let mut circuits = self.circuits.lock();

        let partition = match request.uri().authority() {
            Some(authority) if self.partitioned => {
                let authority = authority.as_str();
                if circuits.contains_key(authority) || circuits.len() < MAX_PARTITIONS {
                    Arc::from(authority)
                } else {
                    Arc::clone(&self.destination)
                }
            }
            _ => Arc::clone(&self.destination),
        };

        let engine = circuits
            .entry(Arc::clone(&partition))
            .or_insert_with(|| Arc::new(CircuitEngine::new(self.options, self.clock.clone())));
        let engine = Arc::clone(engine);

        (partition, engine)
    }

    /// State of the circuit that calls to `authority` go through.
    ///
    /// Circuits that never saw a call are closed.
    pub fn state(&self, authority: &str) -> CircuitState {
        let circuits = self.circuits.lock();

        let engine = if self.partitioned {
            circuits
                .get(authority)
                .or_else(|| (circuits.len() >= MAX_PARTITIONS).then(|| circuits.get(&*self.destination)).flatten())
        } else {
            circuits.get(&*self.destination)
        };

        engine.map_or(CircuitState::Closed, |engine| engine.state())
    }

    #[cfg(test)]
    fn circuit_count(&self) -> usize {
        self.circuits.lock().len()
    }
}

/// Creates [`CircuitBreaker`] stages sharing the same circuits.
#[derive(Debug, Clone)]
pub(crate) struct CircuitBreakerLayer {
    shared: Arc<BreakerShared>,
}

impl CircuitBreakerLayer {
    pub fn new(options: CircuitBreakerOptions, context: &PipelineContext, partitioned: bool) -> Self {
        Self {
            shared: Arc::new(BreakerShared {
                engines: Arc::new(Engines::new(
                    options,
                    context.clock().clone(),
                    Arc::clone(context.destination()),
                    partitioned,
                )),
                destination: Arc::clone(context.destination()),
                sink: Arc::clone(context.sink()),
            }),
        }
    }

    pub fn engines(&self) -> &Arc<Engines> {
        &self.shared.engines
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreaker<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreaker {
            shared: Arc::clone(&self.shared),
            inner,
        }
    }
}
