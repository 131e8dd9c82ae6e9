// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side runtime that ships buffered beacons to a collector and adapts
//! to the configuration the collector sends back.
//!
//! [`ConfigurationStore`] is the entry point: create one per client, call
//! [`ConfigurationStore::initialize`] to handshake and start the background
//! sender, register sessions, and call [`ConfigurationStore::shutdown`] when
//! done.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod attributes;
pub mod beacon;
pub mod config;
pub mod configuration;
pub mod http;
pub mod response;
pub mod sender;
pub mod session;

pub use attributes::{
    AttributeSet, ResponseAttribute, ResponseAttributes, ResponseAttributesBuilder,
};
pub use beacon::Beacon;
pub use config::{ClientConfig, ClientEnv, ConfigError, DeploymentType, SenderSettings};
pub use configuration::{ConfigurationStore, InitError};
pub use http::{
    BackoffConfig, BackoffState, DefaultHttpClientProvider, HttpClient, HttpClientConfiguration,
    HttpClientProvider, RawResponse, ReqwestHttpClient, TransportError,
};
pub use response::{
    parse_key_value_pairs, parse_response, parse_retry_after, ResponseError, StatusResponse,
};
pub use sender::{BeaconSender, SenderState, SenderStatus};
pub use session::{BeaconSession, SessionRef, SessionRegistry};
