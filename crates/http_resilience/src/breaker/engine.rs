// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;

use super::{CircuitState, ExecutionResult, FailureWindow, WindowSnapshot};
use crate::options::CircuitBreakerOptions;

/// How an admitted call takes part in the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    /// Admitted while closed; the outcome feeds the failure window.
    Normal,
    /// The single trial call of a half-open circuit; the outcome decides the next state.
    Trial,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EnterCircuitResult {
    Accepted {
        mode: ExecutionMode,
        /// The call found the break duration elapsed and moved the circuit to half-open.
        half_opened: bool,
    },
    Rejected {
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, PartialEq)]
pub(crate) enum ExitCircuitResult {
    Unchanged,
    Opened { snapshot: WindowSnapshot, cause: Arc<str> },
    Reopened { cause: Arc<str> },
    Closed { open_duration: Duration, cause: Arc<str> },
}

/// State machine of one circuit.
#[derive(Debug)]
pub(crate) struct CircuitEngine {
    state: Mutex<State>,
    options: CircuitBreakerOptions,
    clock: Clock,
}

#[derive(Debug)]
enum State {
    Closed { window: FailureWindow },
    Open { open_until: Instant, opened: Opened },
    HalfOpen { trial_in_flight: bool, opened: Opened },
}

/// What the circuit remembers about the failure that first opened it.
#[derive(Debug, Clone)]
struct Opened {
    at: Instant,
    cause: Arc<str>,
}

impl CircuitEngine {
    pub fn new(options: CircuitBreakerOptions, clock: Clock) -> Self {
        Self {
            state: Mutex::new(State::Closed {
                window: FailureWindow::new(options.sampling_duration),
            }),
            options,
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        match &*self.state.lock() {
            State::Closed { .. } => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn enter(&self) -> EnterCircuitResult {
        // Read the clock before taking the lock.
        let now = self.clock.instant();
        let mut state = self.state.lock();

        match &mut *state {
            State::Closed { .. } => EnterCircuitResult::Accepted {
                mode: ExecutionMode::Normal,
                half_opened: false,
            },
            State::Open { open_until, opened } => {
                if now < *open_until {
                    return EnterCircuitResult::Rejected {
                        retry_after: Some(open_until.saturating_duration_since(now)),
                    };
                }

                let opened = opened.clone();
                *state = State::HalfOpen {
                    trial_in_flight: true,
                    opened,
                };
                EnterCircuitResult::Accepted {
                    mode: ExecutionMode::Trial,
                    half_opened: true,
                }
            }
            State::HalfOpen { trial_in_flight, .. } => {
                if *trial_in_flight {
                    return EnterCircuitResult::Rejected { retry_after: None };
                }

                *trial_in_flight = true;
                EnterCircuitResult::Accepted {
                    mode: ExecutionMode::Trial,
                    half_opened: false,
                }
            }
        }
    }

    /// Records the outcome of an admitted call. `cause` describes a failure and is only
    /// kept when the failure changes the state.
    pub fn exit(&self, result: ExecutionResult, mode: ExecutionMode, cause: impl FnOnce() -> Arc<str>) -> ExitCircuitResult {
        let now = self.clock.instant();
        let mut state = self.state.lock();

        match (&mut *state, mode) {
            (State::Closed { window }, ExecutionMode::Normal) => {
                window.record(result, now);
                if result == ExecutionResult::Success {
                    return ExitCircuitResult::Unchanged;
                }

                let snapshot = window.snapshot(now);
                if !snapshot.is_unhealthy(self.options.failure_ratio, self.options.minimum_throughput) {
                    return ExitCircuitResult::Unchanged;
                }

                let cause = cause();
                *state = State::Open {
                    open_until: self.reopen_at(now),
                    opened: Opened {
                        at: now,
                        cause: Arc::clone(&cause),
                    },
                };
                ExitCircuitResult::Opened { snapshot, cause }
            }
            (State::HalfOpen { opened, .. }, ExecutionMode::Trial) => match result {
                ExecutionResult::Success => {
                    let opened = opened.clone();
                    *state = State::Closed {
                        window: FailureWindow::new(self.options.sampling_duration),
                    };
                    ExitCircuitResult::Closed {
                        open_duration: now.saturating_duration_since(opened.at),
                        cause: opened.cause,
                    }
                }
                ExecutionResult::Failure => {
                    let opened = opened.clone();
                    *state = State::Open {
                        open_until: self.reopen_at(now),
                        opened,
                    };
                    ExitCircuitResult::Reopened { cause: cause() }
                }
            },
            // Late results of calls admitted under an earlier state are ignored.
            _ => ExitCircuitResult::Unchanged,
        }
    }

    /// Frees the trial slot of a half-open circuit whose trial call was dropped.
    pub fn abandon_trial(&self) {
        if let State::HalfOpen { trial_in_flight, .. } = &mut *self.state.lock() {
            *trial_in_flight = false;
        }
    }

    pub fn break_duration(&self) -> Duration {
        self.options.break_duration
    }

    /// End of the break started at `now`, saturated to the furthest representable instant.
    fn reopen_at(&self, now: Instant) -> Instant {
        let mut span = self.options.break_duration;
        loop {
            if let Some(at) = now.checked_add(span) {
                return at;
            }
            span /= 2;
        }
    }
}
