// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use layered::{Layer, Service};
use recoverable::RecoveryKind;
use tick::Clock;

use super::{Attempt, DelayBackoff};
use crate::context::PipelineContext;
use crate::message::clone_request;
use crate::options::RetryOptions;
use crate::{HttpOutcome, HttpRequest, classify};

/// Re-issues calls to the inner service while they end with a transient outcome.
#[derive(Debug)]
pub(crate) struct Retry<S> {
    shared: Arc<RetryShared>,
    inner: S,
}

#[derive(Debug)]
struct RetryShared {
    clock: Clock,
    max_retry_attempts: u32,
    backoff: DelayBackoff,
    destination: Arc<str>,
}

impl<S: Clone> Clone for Retry<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<HttpRequest> for Retry<S>
where
    S: Service<HttpRequest, Out = HttpOutcome>,
{
    type Out = HttpOutcome;

    async fn execute(&self, mut input: HttpRequest) -> Self::Out {
        let mut attempt = Attempt::first(self.shared.max_retry_attempts);
        let mut delays = self.shared.backoff.delays();

        loop {
            // The last attempt consumes the request; earlier ones keep a copy for the next try.
            let kept = (!attempt.is_last()).then(|| clone_request(&input));

            let outcome = self.inner.execute(input).await;

            match self.shared.evaluate_attempt(kept, outcome, attempt, &mut delays) {
                ControlFlow::Continue(next) => {
                    self.shared.clock.delay(next.delay).await;
                    input = next.input;
                    attempt = next.attempt;
                }
                ControlFlow::Break(outcome) => return outcome,
            }
        }
    }
}

impl RetryShared {
    fn evaluate_attempt(
        &self,
        kept: Option<HttpRequest>,
        outcome: HttpOutcome,
        attempt: Attempt,
        delays: &mut impl Iterator<Item = Duration>,
    ) -> ControlFlow<HttpOutcome, ContinueRetry> {
        if classify(&outcome).kind() != RecoveryKind::Retry {
            return ControlFlow::Break(outcome);
        }

        let (Some(input), Some(next_attempt)) = (kept, attempt.next(self.max_retry_attempts)) else {
            self.emit_telemetry(attempt, Duration::ZERO);
            return ControlFlow::Break(outcome);
        };

        let delay = delays.next().unwrap_or(Duration::ZERO);
        self.emit_telemetry(attempt, delay);

        ControlFlow::Continue(ContinueRetry {
            input,
            attempt: next_attempt,
            delay,
        })
    }

    fn emit_telemetry(&self, attempt: Attempt, delay: Duration) {
        tracing::event!(
            name: "http_resilience.retry",
            tracing::Level::WARN,
            destination.name = %self.destination,
            strategy.name = "retry",
            resilience.attempt.index = attempt.index(),
            resilience.attempt.is_last = attempt.is_last(),
            resilience.retry.delay = delay.as_secs_f32(),
        );
    }
}

/// State carried from one attempt to the next.
struct ContinueRetry {
    input: HttpRequest,
    attempt: Attempt,
    delay: Duration,
}

/// Creates [`Retry`] stages.
#[derive(Debug, Clone)]
pub(crate) struct RetryLayer {
    shared: Arc<RetryShared>,
}

impl RetryLayer {
    pub fn new(options: &RetryOptions, context: &PipelineContext) -> Self {
        Self {
            shared: Arc::new(RetryShared {
                clock: context.clock().clone(),
                max_retry_attempts: options.max_retry_attempts,
                backoff: DelayBackoff::from(options),
                destination: Arc::clone(context.destination()),
            }),
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            shared: Arc::clone(&self.shared),
            inner,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::time::Instant;

    use parking_lot::Mutex;
    use tick::ClockControl;
    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;
    use crate::HttpError;
    use crate::options::Backoff;
    use crate::testing::{FakeTransport, LogCapture, get, ok, status, transport_failure};

    fn retry_layer(clock: &Clock, options: &RetryOptions) -> RetryLayer {
        RetryLayer::new(options, &PipelineContext::new(clock.clone(), "payments"))
    }

    /// Transport that records the clock instant of every attempt.
    fn timed_transport(clock: &Clock, outcome: fn(usize) -> HttpOutcome) -> (FakeTransport, Arc<Mutex<Vec<Instant>>>) {
        let instants = Arc::new(Mutex::new(Vec::new()));
        let transport = FakeTransport::new({
            let clock = clock.clone();
            let instants = Arc::clone(&instants);
            move |index| {
                instants.lock().push(clock.instant());
                outcome(index)
            }
        });
        (transport, instants)
    }

    fn gaps_in_secs(instants: &[Instant]) -> Vec<u64> {
        instants.windows(2).map(|w| w[1].duration_since(w[0]).as_secs()).collect()
    }

    #[tokio::test]
    async fn exponential_delays_then_gives_up() {
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();
        let (transport, instants) = timed_transport(&clock, |_| status(500));
        let service = retry_layer(&clock, &RetryOptions::default()).layer(transport.clone());

        let response = service.execute(get("/charge")).await.unwrap();

        assert_eq!(response.status(), 500);
        assert_eq!(transport.calls(), 4);
        assert_eq!(gaps_in_secs(&instants.lock()), [5, 10, 20]);
    }

    #[tokio::test]
    async fn delays_capped_at_max_delay() {
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();
        let (transport, instants) = timed_transport(&clock, |_| transport_failure());
        let options = RetryOptions {
            max_retry_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(12),
            backoff: Backoff::Exponential,
        };
        let service = retry_layer(&clock, &options).layer(transport.clone());

        service.execute(get("/")).await.unwrap_err();

        assert_eq!(transport.calls(), 6);
        assert_eq!(gaps_in_secs(&instants.lock()), [5, 10, 12, 12, 12]);
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();
        let transport = FakeTransport::new(|index| if index < 2 { transport_failure() } else { ok() });
        let service = retry_layer(&clock, &RetryOptions::default()).layer(transport.clone());

        let response = service.execute(get("/")).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_outcomes_pass_through() {
        let clock = Clock::new_frozen();

        for code in [400, 404, 429, 503] {
            let transport = FakeTransport::always(code);
            let service = retry_layer(&clock, &RetryOptions::default()).layer(transport.clone());

            let response = service.execute(get("/")).await.unwrap();

            assert_eq!(response.status(), code);
            assert_eq!(transport.calls(), 1, "status {code} must not be retried");
        }
    }

    #[tokio::test]
    async fn local_rejections_are_not_retried() {
        let clock = Clock::new_frozen();
        let transport = FakeTransport::new(|_| Err(HttpError::Overloaded { destination: "payments".into() }));
        let service = retry_layer(&clock, &RetryOptions::default()).layer(transport.clone());

        let error = service.execute(get("/")).await.unwrap_err();

        assert!(matches!(error, HttpError::Overloaded { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn every_attempt_sees_the_same_request() {
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = retry_layer(&clock, &RetryOptions::default()).layer(layered::Execute::new({
            let seen = Arc::clone(&seen);
            move |request: HttpRequest| {
                seen.lock().push((request.uri().to_string(), request.body().clone()));
                async { status(500) }
            }
        }));

        let request = http::Request::builder()
            .method("POST")
            .uri("https://pay.example.com/charge")
            .body(bytes::Bytes::from_static(b"{\"amount\":5}"))
            .unwrap();
        service.execute(request).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert!(
            seen.iter()
                .all(|(uri, body)| uri == "https://pay.example.com/charge" && body.as_ref() == b"{\"amount\":5}")
        );
    }

    #[tokio::test]
    async fn retry_emits_log() {
        let log = LogCapture::new();
        let _guard = log.subscriber().set_default();
        let clock = ClockControl::new().auto_advance_timers(true).to_clock();
        let options = RetryOptions {
            max_retry_attempts: 1,
            ..RetryOptions::default()
        };
        let service = retry_layer(&clock, &options).layer(FakeTransport::always(500));

        service.execute(get("/")).await.unwrap();

        log.assert_contains("http_resilience::retry");
        log.assert_contains("destination.name=payments");
        log.assert_contains("resilience.attempt.index=0");
        log.assert_contains("resilience.attempt.is_last=true");
        log.assert_contains("resilience.retry.delay=5");
    }
}
