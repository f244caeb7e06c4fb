// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for destination registration and lookup using only public API.

use std::sync::Arc;

use bytes::Bytes;
use http::{StatusCode, Uri};
use http_resilience::options::{DestinationProfile, PolicyKind, PolicySpec};
use http_resilience::{
    CircuitState, ConfigError, HttpOutcome, HttpRequest, HttpResponse, ResilientClient, ResilientClients, Transport,
    destination_name,
};
use layered::{Execute, Service};
use parking_lot::Mutex;
use tick::Clock;

/// A consumer that finds its destination by its own type name.
struct RecommendationsClient {
    client: ResilientClient,
}

impl RecommendationsClient {
    fn new(clients: &ResilientClients) -> Result<Self, ConfigError> {
        Ok(Self {
            client: clients.client(&destination_name::<Self>())?,
        })
    }

    async fn for_user(&self, user: u32) -> HttpOutcome {
        self.client.execute(request(&format!("/for/{user}"))).await
    }
}

fn request(uri: &str) -> HttpRequest {
    http::Request::get(uri).body(Bytes::new()).unwrap()
}

/// Transport that answers 404 and records every URI it was asked for.
fn recording_transport() -> (impl Transport, Arc<Mutex<Vec<String>>>) {
    let uris = Arc::new(Mutex::new(Vec::new()));
    let transport = Execute::new({
        let uris = Arc::clone(&uris);
        move |request: HttpRequest| {
            uris.lock().push(request.uri().to_string());
            async {
                let mut response = HttpResponse::new(Bytes::from_static(b"missing"));
                *response.status_mut() = StatusCode::NOT_FOUND;
                HttpOutcome::Ok(response)
            }
        }
    });
    (transport, uris)
}

fn profiles() -> Vec<DestinationProfile> {
    serde_json::from_str::<Vec<DestinationProfile>>(
        r#"[
            { "Name": "catalog", "BaseAddress": "https://catalog.example.com/v1/", "UseStandardResiliencePipeline": true },
            { "Name": "reviews", "BaseAddress": "http://reviews.internal:8080", "CustomResiliencePipeline": [ { "Policy": "Retry" } ] }
        ]"#,
    )
    .unwrap()
}

#[tokio::test]
async fn registers_profiles_from_json() {
    let (transport, uris) = recording_transport();
    let clients = profiles()
        .into_iter()
        .try_fold(ResilientClients::builder(Clock::new_frozen(), transport), |builder, profile| {
            builder.register_destination(profile)
        })
        .unwrap()
        .build();

    let catalog = clients.execute("catalog", request("/items/9?lang=en")).await.unwrap().unwrap();
    let reviews = clients.execute("reviews", request("/latest")).await.unwrap().unwrap();

    assert_eq!(catalog.status(), StatusCode::NOT_FOUND);
    assert_eq!(catalog.body().as_ref(), b"missing");
    assert_eq!(reviews.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        *uris.lock(),
        [
            "https://catalog.example.com/v1/items/9?lang=en",
            "http://reviews.internal:8080/latest"
        ]
    );
}

#[tokio::test]
async fn unregistered_name_fails_loudly() {
    let (transport, uris) = recording_transport();
    let clients = ResilientClients::builder(Clock::new_frozen(), transport).build();

    let error = clients.execute("catalog", request("/")).await.unwrap_err();

    assert_eq!(error, ConfigError::UnknownDestination("catalog".to_string()));
    assert_eq!(error.to_string(), "destination 'catalog' is not registered");
    assert!(uris.lock().is_empty());
}

#[test]
fn duplicate_names_are_rejected() {
    let (transport, _uris) = recording_transport();
    let profile = DestinationProfile::new("catalog", Uri::from_static("https://catalog.example.com"));

    let error = ResilientClients::builder(Clock::new_frozen(), transport)
        .register_destination(profile.clone())
        .unwrap()
        .register_destination(profile)
        .unwrap_err();

    assert_eq!(error, ConfigError::DuplicateDestination("catalog".to_string()));
}

#[test]
fn oversized_break_duration_is_rejected_at_registration() {
    let (transport, _uris) = recording_transport();
    let profile = DestinationProfile::new("catalog", Uri::from_static("https://catalog.example.com")).policy(
        PolicySpec::new(PolicyKind::CircuitBreaker)
            .parameter("MinimumThroughput", "2")
            .parameter("DurationInSeconds", "9223372036854775807"),
    );

    let error = ResilientClients::builder(Clock::new_frozen(), transport)
        .register_destination(profile)
        .unwrap_err();

    assert!(matches!(
        error,
        ConfigError::InvalidParameter {
            policy: PolicyKind::CircuitBreaker,
            key: "DurationInSeconds",
            ..
        }
    ));
}

#[tokio::test]
async fn names_derived_from_consumer_types() {
    let (transport, uris) = recording_transport();
    let name = destination_name::<RecommendationsClient>();
    let clients = ResilientClients::builder(Clock::new_frozen(), transport)
        .register_destination(DestinationProfile::new(
            name.clone(),
            Uri::from_static("https://recommendations.example.com"),
        ))
        .unwrap()
        .build();

    let recommendations = RecommendationsClient::new(&clients).unwrap();
    recommendations.for_user(42).await.unwrap();

    assert_eq!(name, "RecommendationsClient");
    assert_eq!(recommendations.client.name(), "RecommendationsClient");
    assert_eq!(*uris.lock(), ["https://recommendations.example.com/for/42"]);
}

#[tokio::test]
async fn client_handle_is_a_service() {
    let (transport, _uris) = recording_transport();
    let profile = DestinationProfile::new("catalog", Uri::from_static("https://catalog.example.com")).standard_pipeline();
    let client = ResilientClients::builder(Clock::new_frozen(), transport)
        .register_destination(profile)
        .unwrap()
        .build()
        .client("catalog")
        .unwrap();

    let response = Service::execute(&client, request("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(client.base_address().host(), Some("catalog.example.com"));
    assert_eq!(client.circuit_state(), Some(CircuitState::Closed));
}
