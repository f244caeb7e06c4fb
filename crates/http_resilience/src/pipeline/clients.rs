// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;

use http::Uri;
use layered::{DynamicServiceExt, Service};
use tick::Clock;

use super::compose::{ComposedPipeline, compose};
use crate::breaker::{CircuitEventSink, CircuitState, TracingCircuitSink};
use crate::context::PipelineContext;
use crate::message::{BoxedService, resolve_uri};
use crate::options::{DestinationProfile, resolve_profile};
use crate::{ConfigError, HttpError, HttpOutcome, HttpRequest, Transport};

/// Resilient clients of every registered destination, looked up by name.
///
/// The mapping is built once with [`ResilientClients::builder`] and is immutable afterwards.
/// Cloning is cheap; clones share pipelines, permit pools and circuits.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use http::Uri;
/// use http_resilience::options::DestinationProfile;
/// use http_resilience::{HttpOutcome, HttpRequest, HttpResponse, ResilientClients};
/// use layered::Execute;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let transport = Execute::new(|request: HttpRequest| async move {
///     assert_eq!(request.uri(), "https://catalog.example.com/items?page=2");
///     HttpOutcome::Ok(HttpResponse::new(Bytes::from_static(b"[]")))
/// });
///
/// let clients = ResilientClients::builder(Clock::new_frozen(), transport)
///     .register_destination(
///         DestinationProfile::new("catalog", Uri::from_static("https://catalog.example.com")).standard_pipeline(),
///     )?
///     .build();
///
/// let request = http::Request::get("/items?page=2").body(Bytes::new())?;
/// let response = clients.execute("catalog", request).await??;
/// assert_eq!(response.body().as_ref(), b"[]");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ResilientClients {
    clients: Arc<HashMap<String, ResilientClient>>,
}

impl ResilientClients {
    /// Starts registering destinations that share `clock` and, unless registered with their
    /// own, `transport`.
    #[must_use]
    pub fn builder(clock: Clock, transport: impl Transport) -> ResilientClientsBuilder {
        ResilientClientsBuilder {
            clock,
            transport: transport.into_dynamic(),
            sink: Arc::new(TracingCircuitSink),
            clients: HashMap::new(),
        }
    }

    /// Sends `request` through the pipeline of the destination called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDestination`] if no destination is registered under
    /// `name`. The outcome of the call itself is the inner result.
    pub async fn execute(&self, name: &str, request: HttpRequest) -> Result<HttpOutcome, ConfigError> {
        let client = self.lookup(name)?;
        Ok(client.execute(request).await)
    }

    /// Returns the client of the destination called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDestination`] if no destination is registered under
    /// `name`.
    pub fn client(&self, name: &str) -> Result<ResilientClient, ConfigError> {
        self.lookup(name).cloned()
    }

    /// Names of the registered destinations, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str) -> Result<&ResilientClient, ConfigError> {
        self.clients
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDestination(name.to_string()))
    }
}

/// Registers destinations and composes their pipelines.
#[derive(Debug)]
pub struct ResilientClientsBuilder {
    clock: Clock,
    transport: BoxedService,
    sink: Arc<dyn CircuitEventSink>,
    clients: HashMap<String, ResilientClient>,
}

impl ResilientClientsBuilder {
    /// Reports circuit transitions of destinations registered afterwards to `sink`.
    ///
    /// The default sink is [`TracingCircuitSink`].
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn CircuitEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers a destination that uses the shared transport.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the name is empty or already registered, if the base
    /// address is not absolute, or if a policy parameter cannot be used.
    pub fn register_destination(self, profile: DestinationProfile) -> Result<Self, ConfigError> {
        let transport = self.transport.clone();
        self.register(profile, transport)
    }

    /// Registers a destination that sends its calls through `transport`.
    ///
    /// # Errors
    ///
    /// Same as [`register_destination`](Self::register_destination).
    pub fn register_destination_with_transport(
        self,
        profile: DestinationProfile,
        transport: impl Transport,
    ) -> Result<Self, ConfigError> {
        self.register(profile, transport.into_dynamic())
    }

    /// Freezes the registered destinations.
    #[must_use]
    pub fn build(self) -> ResilientClients {
        ResilientClients {
            clients: Arc::new(self.clients),
        }
    }

    fn register(mut self, profile: DestinationProfile, transport: BoxedService) -> Result<Self, ConfigError> {
        let name = profile.name();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.clients.contains_key(name) {
            return Err(ConfigError::DuplicateDestination(name.to_string()));
        }
        profile.validate_base_address()?;
        let stages = resolve_profile(&profile)?;

        let context = PipelineContext::new(self.clock.clone(), name).event_sink(Arc::clone(&self.sink));
        let pipeline = compose(&stages, profile.use_standard_resilience_pipeline(), &context, transport);

        tracing::event!(
            name: "http_resilience.destination.registered",
            tracing::Level::DEBUG,
            destination.name = name,
            destination.base_address = %profile.base_address(),
            destination.stages = stages.len(),
            destination.standard_pipeline = profile.use_standard_resilience_pipeline(),
        );

        let client = ResilientClient {
            inner: Arc::new(ClientInner {
                name: Arc::clone(context.destination()),
                base_address: profile.base_address().clone(),
                pipeline,
            }),
        };
        self.clients.insert(name.to_string(), client);
        Ok(self)
    }
}

/// Client of one destination.
///
/// Cloning is cheap; clones share the destination's pipeline.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    name: Arc<str>,
    base_address: Uri,
    pipeline: ComposedPipeline,
}

impl ResilientClient {
    /// Sends `request` through the destination's pipeline.
    ///
    /// A request URI without scheme and authority is resolved against the base address first.
    /// HTTP error statuses are returned as responses; only failures that produced no response
    /// are errors.
    pub async fn execute(&self, request: HttpRequest) -> HttpOutcome {
        let (mut parts, body) = request.into_parts();
        parts.uri = resolve_uri(&self.inner.base_address, &parts.uri).map_err(HttpError::transport)?;

        self.inner
            .pipeline
            .service
            .execute(HttpRequest::from_parts(parts, body))
            .await
    }

    /// The destination name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The base address relative requests are resolved against.
    #[must_use]
    pub fn base_address(&self) -> &Uri {
        &self.inner.base_address
    }

    /// Current state of the circuit that calls to the base address go through.
    ///
    /// Returns `None` when the pipeline has no circuit breaker.
    #[must_use]
    pub fn circuit_state(&self) -> Option<CircuitState> {
        let authority = self.inner.base_address.authority().map_or("", |authority| authority.as_str());
        self.inner
            .pipeline
            .breaker
            .as_ref()
            .map(|breaker| breaker.state(authority))
    }
}

impl Service<HttpRequest> for ResilientClient {
    type Out = HttpOutcome;

    async fn execute(&self, input: HttpRequest) -> Self::Out {
        Self::execute(self, input).await
    }
}
