// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{Either, select};
use layered::{Layer, Service};
use tick::Clock;

use crate::context::PipelineContext;
use crate::options::TimeoutOptions;
use crate::{HttpError, HttpOutcome, HttpRequest};

/// Cancels calls to the inner service that outlive the configured timeout.
#[derive(Debug)]
pub(crate) struct Timeout<S> {
    shared: Arc<TimeoutShared>,
    inner: S,
}

#[derive(Debug)]
struct TimeoutShared {
    clock: Clock,
    timeout: Duration,
    destination: Arc<str>,
}

impl TimeoutShared {
    fn timed_out(&self) -> HttpError {
        tracing::event!(
            name: "http_resilience.timeout",
            tracing::Level::WARN,
            destination.name = %self.destination,
            strategy.name = "timeout",
            timeout.ms = self.timeout.as_millis(),
        );

        HttpError::Timeout {
            destination: Arc::clone(&self.destination),
            timeout: self.timeout,
        }
    }
}

impl<S: Clone> Clone for Timeout<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<HttpRequest> for Timeout<S>
where
    S: Service<HttpRequest, Out = HttpOutcome>,
{
    type Out = HttpOutcome;

    async fn execute(&self, input: HttpRequest) -> Self::Out {
        let call = pin!(self.inner.execute(input));
        let deadline = pin!(self.shared.clock.delay(self.shared.timeout));

        // The inner call is polled first, so an outcome that is ready when the deadline
        // fires still wins.
        match select(call, deadline).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(((), _)) => Err(self.shared.timed_out()),
        }
    }
}

/// Creates [`Timeout`] stages.
#[derive(Debug, Clone)]
pub(crate) struct TimeoutLayer {
    shared: Arc<TimeoutShared>,
}

impl TimeoutLayer {
    pub fn new(options: TimeoutOptions, context: &PipelineContext) -> Self {
        Self {
            shared: Arc::new(TimeoutShared {
                clock: context.clock().clone(),
                timeout: options.timeout,
                destination: Arc::clone(context.destination()),
            }),
        }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = Timeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Timeout {
            shared: Arc::clone(&self.shared),
            inner,
        }
    }
}
