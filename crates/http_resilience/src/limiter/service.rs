// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use layered::{Layer, Service};

use super::PermitPool;
use crate::context::PipelineContext;
use crate::options::ConcurrencyLimiterOptions;
use crate::{HttpError, HttpOutcome, HttpRequest};

/// Bounds the number of calls in flight against the inner service.
#[derive(Debug)]
pub(crate) struct ConcurrencyLimiter<S> {
    shared: Arc<LimiterShared>,
    inner: S,
}

#[derive(Debug)]
struct LimiterShared {
    pool: Arc<PermitPool>,
    options: ConcurrencyLimiterOptions,
    destination: Arc<str>,
}

impl<S: Clone> Clone for ConcurrencyLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<HttpRequest> for ConcurrencyLimiter<S>
where
    S: Service<HttpRequest, Out = HttpOutcome>,
{
    type Out = HttpOutcome;

    async fn execute(&self, input: HttpRequest) -> Self::Out {
        let Some(_token) = self.shared.pool.acquire().await else {
            tracing::event!(
                name: "http_resilience.limiter.rejected",
                tracing::Level::WARN,
                destination.name = %self.shared.destination,
                strategy.name = "concurrency_limiter",
                limiter.permit_limit = self.shared.options.permit_limit,
                limiter.queue_limit = self.shared.options.queue_limit,
            );

            return Err(HttpError::Overloaded {
                destination: Arc::clone(&self.shared.destination),
            });
        };

        self.inner.execute(input).await
    }
}

/// Creates [`ConcurrencyLimiter`] stages sharing a single permit pool.
#[derive(Debug, Clone)]
pub(crate) struct ConcurrencyLimiterLayer {
    shared: Arc<LimiterShared>,
}

impl ConcurrencyLimiterLayer {
    pub fn new(options: ConcurrencyLimiterOptions, context: &PipelineContext) -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                pool: Arc::new(PermitPool::new(&options)),
                options,
                destination: Arc::clone(context.destination()),
            }),
        }
    }
}

impl<S> Layer<S> for ConcurrencyLimiterLayer {
    type Service = ConcurrencyLimiter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConcurrencyLimiter {
            shared: Arc::clone(&self.shared),
            inner,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use layered::Execute;
    use tick::Clock;
    use tokio::sync::Notify;

    use super::*;
    use crate::options::QueueOrder;
    use crate::testing::{get, ok};

    fn layer(permit_limit: usize, queue_limit: usize) -> ConcurrencyLimiterLayer {
        ConcurrencyLimiterLayer::new(
            ConcurrencyLimiterOptions {
                permit_limit,
                queue_limit,
                queue_order: QueueOrder::OldestFirst,
            },
            &PipelineContext::new(Clock::new_frozen(), "inventory"),
        )
    }

    #[tokio::test]
    async fn third_call_rejected_without_reaching_inner() {
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let service = {
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            layer(2, 0).layer(Execute::new(move |_request: HttpRequest| {
                let gate = Arc::clone(&gate);
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    gate.notified().await;
                    ok()
                }
            }))
        };

        let first = service.execute(get("/a"));
        let second = service.execute(get("/b"));
        let third = service.execute(get("/c"));

        let (first, second, third) = tokio::join!(
            first,
            second,
            async {
                let outcome = third.await;
                gate.notify_waiters();
                outcome
            }
        );

        first.unwrap();
        second.unwrap();
        assert!(matches!(third, Err(HttpError::Overloaded { ref destination }) if &**destination == "inventory"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.shared.pool.available(), 2);
    }

    #[tokio::test]
    async fn permit_returned_on_inner_failure() {
        let service = layer(1, 0).layer(Execute::new(|_request: HttpRequest| async {
            Err(HttpError::transport("connection refused"))
        }));

        service.execute(get("/")).await.unwrap_err();
        service.execute(get("/")).await.unwrap_err();

        assert_eq!(service.shared.pool.available(), 1);
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(ConcurrencyLimiterLayer: Layer<()>, Send, Sync);
    }
}
