// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use http::Uri;
use serde::{Deserialize, Deserializer};

use crate::ConfigError;

/// Kind of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum PolicyKind {
    /// Re-issues calls that ended with a transient outcome.
    Retry,
    /// Bounds the duration of a single call.
    Timeout,
    /// Rejects calls while the destination is failing.
    CircuitBreaker,
    /// Bounds the number of calls in flight.
    ConcurrencyLimiter,
}

impl PolicyKind {
    /// The configuration name of the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "Retry",
            Self::Timeout => "Timeout",
            Self::CircuitBreaker => "CircuitBreaker",
            Self::ConcurrencyLimiter => "ConcurrencyLimiter",
        }
    }
}

impl Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Retry" => Ok(Self::Retry),
            "Timeout" => Ok(Self::Timeout),
            "CircuitBreaker" => Ok(Self::CircuitBreaker),
            "ConcurrencyLimiter" => Ok(Self::ConcurrencyLimiter),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

/// One entry of a custom pipeline: a policy kind and its raw string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicySpec {
    policy: PolicyKind,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

impl PolicySpec {
    /// Creates an entry without parameters; every option takes its default.
    #[must_use]
    pub fn new(policy: PolicyKind) -> Self {
        Self {
            policy,
            parameters: BTreeMap::new(),
        }
    }

    /// Creates an entry from a policy name as it appears in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPolicy`] if the name is not a known policy.
    pub fn named(policy: &str) -> Result<Self, ConfigError> {
        policy.parse().map(Self::new)
    }

    /// Sets a raw parameter value.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// The policy kind.
    #[must_use]
    pub fn policy(&self) -> PolicyKind {
        self.policy
    }

    /// The raw parameters.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

/// Configuration of one named HTTP destination.
///
/// A profile either uses the standard pipeline (timeout, retry, circuit breaker and
/// concurrency limiter with default options) or an ordered list of policies, outermost
/// first. When both are given, the standard pipeline wins.
///
/// Profiles deserialize from the PascalCase layout used by configuration files:
///
/// ```
/// use http_resilience::options::DestinationProfile;
///
/// let profile: DestinationProfile = serde_json::from_str::<DestinationProfile>(
///     r#"{
///         "BaseAddress": "https://inventory.example.com",
///         "CustomResiliencePipeline": [
///             { "Policy": "Timeout", "Parameters": { "TimeoutInSeconds": "5" } },
///             { "Policy": "Retry" }
///         ]
///     }"#,
/// )?
/// .with_name("inventory");
///
/// assert_eq!(profile.name(), "inventory");
/// assert_eq!(profile.custom_resilience_pipeline().len(), 2);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DestinationProfile {
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "deserialize_uri")]
    base_address: Uri,
    #[serde(default)]
    use_standard_resilience_pipeline: bool,
    #[serde(default)]
    custom_resilience_pipeline: Vec<PolicySpec>,
}

impl DestinationProfile {
    /// Creates a profile with an empty custom pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>, base_address: Uri) -> Self {
        Self {
            name: name.into(),
            base_address,
            use_standard_resilience_pipeline: false,
            custom_resilience_pipeline: Vec::new(),
        }
    }

    /// Replaces the destination name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Uses the standard pipeline for this destination.
    #[must_use]
    pub fn standard_pipeline(mut self) -> Self {
        self.use_standard_resilience_pipeline = true;
        self
    }

    /// Appends a policy to the custom pipeline. Policies wrap in the order they are added.
    #[must_use]
    pub fn policy(mut self, spec: PolicySpec) -> Self {
        self.custom_resilience_pipeline.push(spec);
        self
    }

    /// The destination name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The base address relative requests are resolved against.
    #[must_use]
    pub fn base_address(&self) -> &Uri {
        &self.base_address
    }

    /// Whether the standard pipeline is used.
    #[must_use]
    pub fn use_standard_resilience_pipeline(&self) -> bool {
        self.use_standard_resilience_pipeline
    }

    /// The custom pipeline, outermost policy first.
    #[must_use]
    pub fn custom_resilience_pipeline(&self) -> &[PolicySpec] {
        &self.custom_resilience_pipeline
    }

    pub(crate) fn validate_base_address(&self) -> Result<(), ConfigError> {
        let reason = if self.base_address.scheme().is_none() {
            "a scheme is required"
        } else if self.base_address.authority().is_none() {
            "a host is required"
        } else {
            return Ok(());
        };

        Err(ConfigError::InvalidBaseAddress {
            name: self.name.clone(),
            address: self.base_address.to_string(),
            reason: reason.to_string(),
        })
    }
}

fn deserialize_uri<'de, D>(deserializer: D) -> Result<Uri, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}
