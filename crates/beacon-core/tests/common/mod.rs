// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-process collector shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{
    ClientConfig, ConfigurationStore, HttpClient, HttpClientConfiguration, HttpClientProvider,
    RawResponse, SenderSettings, TransportError,
};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

/// One scripted collector reaction.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },
    Unreachable,
    /// Hangs for the given time, then answers `200` with an empty body.
    Stall(Duration),
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Respond {
            status: 200,
            body: body.to_string(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    pub fn throttled(retry_after_secs: u64) -> Self {
        Reply::Respond {
            status: 429,
            body: String::new(),
            retry_after: Some(retry_after_secs),
        }
    }

    async fn into_result(self) -> Result<RawResponse, TransportError> {
        let reply = match self {
            Reply::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Reply::ok("")
            }
            other => other,
        };
        match reply {
            Reply::Respond {
                status,
                body,
                retry_after,
            } => {
                let mut headers = HeaderMap::new();
                if let Some(seconds) = retry_after {
                    headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
                }
                Ok(RawResponse {
                    status,
                    body,
                    headers,
                })
            }
            Reply::Unreachable => Err(TransportError::Unreachable("scripted".into())),
            Reply::Stall(_) => Err(TransportError::Unreachable("stalled".into())),
        }
    }
}

/// Request observed by the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Beacon(String),
}

/// Collector answering from queues, falling back to `200` with an empty body
/// unless another fallback is set.
#[derive(Debug, Default)]
pub struct ScriptedCollector {
    status_replies: Mutex<VecDeque<Reply>>,
    beacon_replies: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    beacon_latency: Mutex<Duration>,
    requests: Mutex<Vec<Request>>,
    configurations: Mutex<Vec<HttpClientConfiguration>>,
}

impl ScriptedCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, reply: Reply) {
        self.status_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_beacon(&self, reply: Reply) {
        self.beacon_replies.lock().unwrap().push_back(reply);
    }

    /// Reply used once a queue runs dry.
    pub fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock().unwrap() = Some(reply);
    }

    /// Time every beacon request takes before its reply is produced.
    pub fn set_beacon_latency(&self, latency: Duration) {
        *self.beacon_latency.lock().unwrap() = latency;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn beacons(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                Request::Beacon(body) => Some(body),
                Request::Status => None,
            })
            .collect()
    }

    pub fn status_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|request| matches!(request, Request::Status))
            .count()
    }

    pub fn configurations(&self) -> Vec<HttpClientConfiguration> {
        self.configurations.lock().unwrap().clone()
    }

    fn next(&self, queue: &Mutex<VecDeque<Reply>>) -> Reply {
        let queued = queue.lock().unwrap().pop_front();
        queued
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or_else(|| Reply::ok(""))
    }
}

#[async_trait]
impl HttpClient for ScriptedCollector {
    async fn send_status_request(&self) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(Request::Status);
        self.next(&self.status_replies).into_result().await
    }

    async fn send_beacon_request(&self, payload: Vec<u8>) -> Result<RawResponse, TransportError> {
        let body = String::from_utf8(payload).expect("beacons are utf-8");
        self.requests.lock().unwrap().push(Request::Beacon(body));
        let latency = *self.beacon_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.next(&self.beacon_replies).into_result().await
    }
}

/// Hands out the shared collector for every configuration.
pub struct ScriptedProvider(pub Arc<ScriptedCollector>);

impl HttpClientProvider for ScriptedProvider {
    fn create_client(
        &self,
        configuration: &HttpClientConfiguration,
    ) -> Result<Arc<dyn HttpClient>, TransportError> {
        self.0
            .configurations
            .lock()
            .unwrap()
            .push(configuration.clone());
        Ok(self.0.clone())
    }
}

pub fn client_config() -> ClientConfig {
    ClientConfig {
        application_name: "shop".into(),
        ..ClientConfig::new("https://collector.example", "app-id", 42)
    }
}

pub fn scripted_store(collector: &Arc<ScriptedCollector>) -> Arc<ConfigurationStore> {
    ConfigurationStore::with_provider(
        client_config(),
        SenderSettings::default(),
        Arc::new(ScriptedProvider(collector.clone())),
    )
}

/// Lets every ready task run before the paused clock moves on.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
