// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Startup parameters of a beacon client.
//!
//! [`ClientConfig`] is the immutable identity a client is created with and
//! [`SenderSettings`] tunes the background sender. Both can be derived from
//! the process environment through [`ClientEnv`].

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::http::BackoffConfig;

const ENV_ENDPOINT_URL: &str = "BEACON_ENDPOINT_URL";
const ENV_APPLICATION_ID: &str = "BEACON_APPLICATION_ID";
const ENV_APPLICATION_NAME: &str = "BEACON_APPLICATION_NAME";
const ENV_VISITOR_ID: &str = "BEACON_VISITOR_ID";
const ENV_DEPLOYMENT: &str = "BEACON_DEPLOYMENT";
const ENV_VERBOSE: &str = "BEACON_VERBOSE";

/// Send interval used until the collector advertises one.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(2 * 60);
/// Maximum beacon size used until the collector advertises one.
pub const DEFAULT_MAX_BEACON_SIZE: usize = 30 * 1024;
/// Upper bound for the handshake backoff (matches the default retry-after).
pub const MAX_HANDSHAKE_BACKOFF: Duration = Duration::from_secs(10 * 60);

/// Invalid or missing startup parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid visitor id {0:?}; expected a 64-bit integer")]
    InvalidVisitorId(String),
    #[error("unknown deployment type {0:?}; expected dynatrace or appmon")]
    UnknownDeployment(String),
}

/// Backend flavour the client reports to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentType {
    #[default]
    Dynatrace,
    AppMon,
}

impl DeploymentType {
    /// Monitor name used until the collector hands out a different one.
    pub fn default_monitor_name(self) -> &'static str {
        match self {
            DeploymentType::Dynatrace => "mbeacon",
            DeploymentType::AppMon => "dynaTraceMonitor",
        }
    }

    /// Server id used until the collector hands out a different one.
    pub fn default_server_id(self) -> i32 {
        1
    }
}

impl FromStr for DeploymentType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dynatrace" => Ok(DeploymentType::Dynatrace),
            "appmon" => Ok(DeploymentType::AppMon),
            other => Err(ConfigError::UnknownDeployment(other.to_string())),
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentType::Dynatrace => f.write_str("dynatrace"),
            DeploymentType::AppMon => f.write_str("appmon"),
        }
    }
}

/// Immutable identity of a client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Collector endpoint without the monitor name path segment.
    pub endpoint_url: String,
    pub application_id: String,
    pub application_name: String,
    pub visitor_id: i64,
    pub deployment: DeploymentType,
    /// Log every collector request and response.
    pub verbose: bool,
}

impl ClientConfig {
    pub fn new(
        endpoint_url: impl Into<String>,
        application_id: impl Into<String>,
        visitor_id: i64,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            application_id: application_id.into(),
            application_name: String::new(),
            visitor_id,
            deployment: DeploymentType::default(),
            verbose: false,
        }
    }
}

/// Environment-derived client options.
#[derive(Debug, Clone, Default)]
pub struct ClientEnv {
    pub endpoint_url: Option<String>,
    pub application_id: Option<String>,
    pub application_name: Option<String>,
    pub visitor_id: Option<String>,
    pub deployment: Option<String>,
    pub verbose: bool,
}

impl ClientEnv {
    /// Reads settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Reads settings from key/value pairs.
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| map.get(key).and_then(|value| sanitize_non_empty(value));

        Self {
            endpoint_url: get(ENV_ENDPOINT_URL),
            application_id: get(ENV_APPLICATION_ID),
            application_name: get(ENV_APPLICATION_NAME),
            visitor_id: get(ENV_VISITOR_ID),
            deployment: get(ENV_DEPLOYMENT),
            verbose: parse_bool(map.get(ENV_VERBOSE).map(String::as_str), false),
        }
    }

    /// Validates the captured values into a [`ClientConfig`].
    ///
    /// AppMon deployments identify applications by name, so the application
    /// name stands in for a missing application id there.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let endpoint_url = self
            .endpoint_url
            .clone()
            .ok_or(ConfigError::Missing(ENV_ENDPOINT_URL))?;
        let deployment = match &self.deployment {
            Some(value) => value.parse()?,
            None => DeploymentType::default(),
        };
        let application_name = self.application_name.clone().unwrap_or_default();
        let application_id = match (&self.application_id, deployment) {
            (Some(id), _) => id.clone(),
            (None, DeploymentType::AppMon) if !application_name.is_empty() => {
                application_name.clone()
            }
            (None, _) => return Err(ConfigError::Missing(ENV_APPLICATION_ID)),
        };
        let visitor_id = match &self.visitor_id {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidVisitorId(raw.clone()))?,
            None => return Err(ConfigError::Missing(ENV_VISITOR_ID)),
        };

        Ok(ClientConfig {
            endpoint_url,
            application_id,
            application_name,
            visitor_id,
            deployment,
            verbose: self.verbose,
        })
    }
}

/// Tuning of the background sender.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderSettings {
    /// Flush cadence until the collector advertises one.
    pub default_send_interval: Duration,
    /// Beacon chunk limit until the collector advertises one.
    pub default_max_beacon_size: usize,
    /// Retry policy for handshake transport failures.
    pub handshake_backoff: BackoffConfig,
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            default_send_interval: DEFAULT_SEND_INTERVAL,
            default_max_beacon_size: DEFAULT_MAX_BEACON_SIZE,
            handshake_backoff: BackoffConfig {
                max_backoff: MAX_HANDSHAKE_BACKOFF,
                ..BackoffConfig::default()
            },
        }
    }
}

impl SenderSettings {
    /// Replaces unusable values with defaults.
    pub fn sanitise(mut self) -> Self {
        if self.default_send_interval.is_zero() {
            warn!(
                "default send interval must be > 0; using {:?}",
                DEFAULT_SEND_INTERVAL
            );
            self.default_send_interval = DEFAULT_SEND_INTERVAL;
        }

        if self.default_max_beacon_size == 0 {
            warn!(
                "default max beacon size must be > 0; using {}",
                DEFAULT_MAX_BEACON_SIZE
            );
            self.default_max_beacon_size = DEFAULT_MAX_BEACON_SIZE;
        }

        let backoff = &mut self.handshake_backoff;
        if !backoff.base_seconds.is_finite() || backoff.base_seconds <= 0.0 {
            warn!(
                "handshake backoff base {} must be positive; using 1s",
                backoff.base_seconds
            );
            backoff.base_seconds = 1.0;
        }
        if !backoff.factor.is_finite() || backoff.factor < 1.0 {
            warn!(
                "handshake backoff factor {} must be >= 1; using 2",
                backoff.factor
            );
            backoff.factor = 2.0;
        }
        if backoff.max_backoff > MAX_HANDSHAKE_BACKOFF || backoff.max_backoff.is_zero() {
            warn!(
                "handshake backoff max {:?} outside (0, {:?}]; clamping",
                backoff.max_backoff, MAX_HANDSHAKE_BACKOFF
            );
            backoff.max_backoff = MAX_HANDSHAKE_BACKOFF;
        }

        self
    }
}

fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}
