// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use tick::Clock;

use crate::breaker::{CircuitEventSink, TracingCircuitSink};

/// Dependencies shared by every stage of one destination's pipeline.
#[derive(Debug, Clone)]
pub(crate) struct PipelineContext {
    clock: Clock,
    destination: Arc<str>,
    sink: Arc<dyn CircuitEventSink>,
}

impl PipelineContext {
    pub fn new(clock: Clock, destination: impl Into<Arc<str>>) -> Self {
        Self {
            clock,
            destination: destination.into(),
            sink: Arc::new(TracingCircuitSink),
        }
    }

    #[must_use]
    pub fn event_sink(self, sink: Arc<dyn CircuitEventSink>) -> Self {
        Self { sink, ..self }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn destination(&self) -> &Arc<str> {
        &self.destination
    }

    pub fn sink(&self) -> &Arc<dyn CircuitEventSink> {
        &self.sink
    }
}
