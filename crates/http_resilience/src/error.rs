// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};

use crate::options::PolicyKind;

/// Boxed error produced by a transport.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure outcome of a call made through a resilient client.
///
/// HTTP error statuses are not represented here: a response with status 404 or 500 is
/// still an `Ok` [`HttpResponse`](crate::HttpResponse). This type only covers calls that
/// produced no response at all.
///
/// Use [`Recovery::recovery`] to find out whether a failure is transient.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HttpError {
    /// The transport failed to deliver the request or to receive a response.
    #[error("transport failure: {source}")]
    Transport {
        /// The error reported by the transport.
        #[source]
        source: BoxError,
    },

    /// The call did not complete within the configured timeout.
    #[error("call to '{destination}' timed out after {timeout:?}")]
    Timeout {
        /// Name of the destination the call was made to.
        destination: Arc<str>,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The concurrency limiter rejected the call because its queue was full.
    #[error("too many concurrent calls to '{destination}'")]
    Overloaded {
        /// Name of the destination the call was made to.
        destination: Arc<str>,
    },

    /// The circuit breaker rejected the call without invoking the transport.
    #[error("circuit for '{destination}' is open")]
    CircuitOpen {
        /// Name of the destination the call was made to.
        destination: Arc<str>,
        /// Time left until the circuit lets a trial call through, if known.
        retry_after: Option<Duration>,
    },
}

impl HttpError {
    /// Wraps a transport error.
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport { source: error.into() }
    }

    /// Returns `true` for failures that are worth retrying.
    ///
    /// Transport failures and timeouts are transient. Local rejections produced by the
    /// concurrency limiter or the circuit breaker are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Returns `true` for rejections produced locally by a pipeline stage.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Overloaded { .. } | Self::CircuitOpen { .. })
    }
}

impl Recovery for HttpError {
    fn recovery(&self) -> RecoveryInfo {
        if self.is_transient() {
            RecoveryInfo::retry()
        } else {
            RecoveryInfo::never()
        }
    }
}

/// Configuration or lookup failure.
///
/// These are raised while destinations are registered, or when a call names a destination
/// that was never registered. They are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A parameter of a policy is present but cannot be used.
    #[error("parameter '{key}' of the {policy} policy has invalid value '{value}': {reason}")]
    InvalidParameter {
        /// The policy the parameter belongs to.
        policy: PolicyKind,
        /// The parameter name.
        key: &'static str,
        /// The raw configured value.
        value: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// A custom pipeline names a policy that does not exist.
    #[error("unknown resilience policy '{0}'")]
    UnknownPolicy(String),

    /// A call or lookup names a destination that was never registered.
    #[error("destination '{0}' is not registered")]
    UnknownDestination(String),

    /// A destination name was registered twice.
    #[error("destination '{0}' is already registered")]
    DuplicateDestination(String),

    /// A destination was registered without a name.
    #[error("destination name must not be empty")]
    EmptyName,

    /// The base address of a destination is not an absolute URI.
    #[error("destination '{name}' has an invalid base address '{address}': {reason}")]
    InvalidBaseAddress {
        /// The destination name.
        name: String,
        /// The configured base address.
        address: String,
        /// What is wrong with the address.
        reason: String,
    },
}
