// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use layered::{DynamicServiceExt, Layer};

use crate::breaker::{CircuitBreakerLayer, Engines};
use crate::context::PipelineContext;
use crate::limiter::ConcurrencyLimiterLayer;
use crate::message::BoxedService;
use crate::options::StageOptions;
use crate::retry::RetryLayer;
use crate::timeout::TimeoutLayer;

/// A destination's stages wrapped around its transport.
#[derive(Debug, Clone)]
pub(crate) struct ComposedPipeline {
    pub service: BoxedService,
    /// Circuits of the outermost breaker stage, if any.
    pub breaker: Option<Arc<Engines>>,
}

/// Wraps `transport` in `stages`, the first stage being the outermost.
///
/// Breakers keep one circuit per request authority when `partition_by_authority` is set.
pub(crate) fn compose(
    stages: &[StageOptions],
    partition_by_authority: bool,
    context: &PipelineContext,
    transport: BoxedService,
) -> ComposedPipeline {
    let mut service = transport;
    let mut breaker = None;

    for stage in stages.iter().rev() {
        service = match *stage {
            StageOptions::Timeout(options) => TimeoutLayer::new(options, context).layer(service).into_dynamic(),
            StageOptions::Retry(options) => RetryLayer::new(&options, context).layer(service).into_dynamic(),
            StageOptions::CircuitBreaker(options) => {
                let layer = CircuitBreakerLayer::new(options, context, partition_by_authority);
                breaker = Some(Arc::clone(layer.engines()));
                layer.layer(service).into_dynamic()
            }
            StageOptions::ConcurrencyLimiter(options) => ConcurrencyLimiterLayer::new(options, context).layer(service).into_dynamic(),
        };
    }

    ComposedPipeline { service, breaker }
}
