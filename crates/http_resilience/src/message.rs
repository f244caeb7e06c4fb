// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;
use http::StatusCode;
use http::uri::{PathAndQuery, Uri};
use layered::{DynamicService, Service};
use recoverable::{Recovery, RecoveryInfo};

use crate::HttpError;

/// Request passed through a resilient client.
pub type HttpRequest = http::Request<Bytes>;

/// Response returned by a resilient client.
pub type HttpResponse = http::Response<Bytes>;

/// Result of a single call: a response (of any status) or a failure.
pub type HttpOutcome = Result<HttpResponse, HttpError>;

/// Type-erased pipeline or transport.
pub type BoxedService = DynamicService<HttpRequest, HttpOutcome>;

/// Sends one HTTP request and produces a response or a transport failure.
///
/// Any [`Service`] with matching input and output types is a transport, including closures
/// wrapped in [`layered::Execute`]. The pipeline never opens connections itself.
pub trait Transport: Service<HttpRequest, Out = HttpOutcome> + 'static {}

impl<T> Transport for T where T: Service<HttpRequest, Out = HttpOutcome> + 'static {}

/// Classifies an outcome for the retry and circuit breaker stages.
///
/// Transport failures, timeouts and `500 Internal Server Error` responses are transient and
/// map to [`RecoveryInfo::retry`]. Every other response, and the local rejections produced by
/// the limiter and the breaker, map to [`RecoveryInfo::never`].
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use http_resilience::{HttpResponse, classify};
/// use recoverable::RecoveryKind;
///
/// let mut response = HttpResponse::new(Bytes::new());
/// *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
///
/// assert_eq!(classify(&Ok(response)).kind(), RecoveryKind::Retry);
/// ```
#[must_use]
pub fn classify(outcome: &HttpOutcome) -> RecoveryInfo {
    match outcome {
        Ok(response) if response.status() == StatusCode::INTERNAL_SERVER_ERROR => RecoveryInfo::retry(),
        Ok(_) => RecoveryInfo::never(),
        Err(error) => error.recovery(),
    }
}

/// Copies everything a retry needs to re-send a request.
///
/// Extensions are not cloneable and are therefore not carried over.
pub(crate) fn clone_request(request: &HttpRequest) -> HttpRequest {
    let mut clone = HttpRequest::new(request.body().clone());
    clone.method_mut().clone_from(request.method());
    clone.uri_mut().clone_from(request.uri());
    *clone.version_mut() = request.version();
    clone.headers_mut().clone_from(request.headers());
    clone
}

/// Resolves a request URI that carries no authority against a base address.
///
/// The base path and the request path are joined, and the query of the request is kept.
/// Absolute request URIs are returned unchanged.
pub(crate) fn resolve_uri(base: &Uri, uri: &Uri) -> Result<Uri, http::Error> {
    if uri.authority().is_some() {
        return Ok(uri.clone());
    }

    let base_path = base.path().trim_end_matches('/');
    let path = uri.path().trim_start_matches('/');
    let joined = match uri.query() {
        Some(query) => format!("{base_path}/{path}?{query}"),
        None => format!("{base_path}/{path}"),
    };

    let mut builder = Uri::builder().path_and_query(PathAndQuery::try_from(joined)?);
    if let Some(scheme) = base.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = base.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.build()
}
