// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared, mutable client configuration driven by collector responses.
//!
//! The store is the one place both event producers and the background sender
//! talk to. Producers only read the capture flags and enqueue sessions; the
//! sender applies every collector reply through
//! [`ConfigurationStore::apply_response`]. The capture flag is lock-free, the
//! remaining settings sit behind a `RwLock` and the transport client is
//! published by replacing an `Arc`.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attributes::ResponseAttributes;
use crate::beacon::Beacon;
use crate::config::{ClientConfig, SenderSettings};
use crate::http::{
    DefaultHttpClientProvider, HttpClient, HttpClientConfiguration, HttpClientProvider,
    TransportError,
};
use crate::response::StatusResponse;
use crate::sender::{BeaconSender, SenderState, SenderStatus};
use crate::session::{SessionRef, SessionRegistry};

/// Beacon protocol version written into every beacon prefix.
const BEACON_PROTOCOL_VERSION: u32 = 3;

/// Reasons [`ConfigurationStore::initialize`] can fail.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("initialization aborted by shutdown")]
    Shutdown,
    #[error("collector transport unusable: {0}")]
    Transport(#[from] TransportError),
    #[error("client already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone)]
struct Settings {
    send_interval: Duration,
    monitor_name: String,
    server_id: i32,
    max_beacon_size: usize,
    server_attributes: ResponseAttributes,
}

struct Transport {
    configuration: Arc<HttpClientConfiguration>,
    client: Option<Arc<dyn HttpClient>>,
}

/// Thread-shared configuration of one client instance.
pub struct ConfigurationStore {
    client_config: ClientConfig,
    sender_settings: SenderSettings,
    capture: AtomicBool,
    capture_crashes: AtomicBool,
    capture_errors: AtomicBool,
    multiplicity: AtomicI32,
    session_number: AtomicI32,
    settings: RwLock<Settings>,
    transport: RwLock<Transport>,
    provider: Arc<dyn HttpClientProvider>,
    sessions: Arc<SessionRegistry>,
    sender_status: Arc<SenderStatus>,
    initialized: AtomicBool,
    sender_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl ConfigurationStore {
    /// Creates a store using the `reqwest` transport.
    pub fn new(client_config: ClientConfig, sender_settings: SenderSettings) -> Arc<Self> {
        Self::with_provider(
            client_config,
            sender_settings,
            Arc::new(DefaultHttpClientProvider),
        )
    }

    /// Creates a store whose transport clients come from `provider`.
    pub fn with_provider(
        client_config: ClientConfig,
        sender_settings: SenderSettings,
        provider: Arc<dyn HttpClientProvider>,
    ) -> Arc<Self> {
        let sender_settings = sender_settings.sanitise();
        let deployment = client_config.deployment;
        let monitor_name = deployment.default_monitor_name().to_string();
        let server_id = deployment.default_server_id();
        let http_configuration = HttpClientConfiguration {
            base_url: create_base_url(&client_config.endpoint_url, &monitor_name),
            application_id: client_config.application_id.clone(),
            server_id,
            verbose: client_config.verbose,
        };

        Arc::new(Self {
            settings: RwLock::new(Settings {
                send_interval: sender_settings.default_send_interval,
                monitor_name,
                server_id,
                max_beacon_size: sender_settings.default_max_beacon_size,
                server_attributes: ResponseAttributes::undefined(),
            }),
            transport: RwLock::new(Transport {
                configuration: Arc::new(http_configuration),
                client: None,
            }),
            client_config,
            sender_settings,
            capture: AtomicBool::new(true),
            capture_crashes: AtomicBool::new(true),
            capture_errors: AtomicBool::new(true),
            multiplicity: AtomicI32::new(1),
            session_number: AtomicI32::new(0),
            provider,
            sessions: Arc::new(SessionRegistry::new()),
            sender_status: Arc::new(SenderStatus::default()),
            initialized: AtomicBool::new(false),
            sender_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Builds the transport, performs the handshake and starts the background sender.
    ///
    /// Returns once the collector answered the handshake. Transport failures
    /// during the handshake are retried until [`shutdown`](Self::shutdown) is
    /// called, in which case [`InitError::Shutdown`] is returned.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), InitError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(InitError::AlreadyInitialized);
        }

        let configuration = self.http_client_configuration();
        let client = self.provider.create_client(&configuration)?;
        self.write_transport().client = Some(client);

        let mut sender = BeaconSender::new(
            Arc::clone(self),
            Arc::clone(&self.sender_status),
            self.shutdown.clone(),
        );
        sender.handshake().await?;

        info!(
            capture = self.is_capture(),
            monitor_name = %self.monitor_name(),
            server_id = self.server_id(),
            send_interval = ?self.send_interval(),
            "beacon sender initialized"
        );

        let task = tokio::spawn(sender.run());
        *self.lock_sender_task() = Some(task);
        Ok(())
    }

    /// Applies a collector reply; `None` stands for a reply that could not be decoded.
    pub fn apply_response(&self, response: Option<&StatusResponse>) {
        let Some(response) = response.filter(|response| !response.is_erroneous()) else {
            debug!("disabling capture after missing or erroneous response");
            self.disable_capture();
            return;
        };

        let attributes = response.attributes();
        if !attributes.is_capture() {
            debug!("collector disabled capture");
            self.disable_capture();
            return;
        }
        self.capture.store(true, Ordering::Release);
        self.capture_crashes
            .store(attributes.is_capture_crashes(), Ordering::Release);
        self.capture_errors
            .store(attributes.is_capture_errors(), Ordering::Release);
        self.multiplicity
            .store(attributes.multiplicity(), Ordering::Release);

        let deployment = self.client_config.deployment;
        let monitor_name = attributes
            .monitor_name_if_set()
            .unwrap_or(deployment.default_monitor_name())
            .to_string();
        let server_id = attributes
            .server_id_if_set()
            .unwrap_or(deployment.default_server_id());
        let send_interval = self.effective_send_interval(attributes);
        let max_beacon_size = self.effective_max_beacon_size(attributes);

        let endpoint_changed = {
            let mut settings = self.write_settings();
            settings.send_interval = send_interval;
            settings.max_beacon_size = max_beacon_size;
            settings.server_attributes = settings.server_attributes.merge(attributes);
            settings.monitor_name != monitor_name || settings.server_id != server_id
        };

        if endpoint_changed {
            self.rebuild_transport(monitor_name, server_id);
        }
    }

    fn effective_send_interval(&self, attributes: &ResponseAttributes) -> Duration {
        let default = self.sender_settings.default_send_interval;
        match attributes.send_interval_if_set() {
            Some(millis) if millis > 0 => Duration::from_millis(millis as u64),
            Some(millis) => {
                warn!(
                    send_interval_ms = millis,
                    "ignoring non-positive send interval from collector; using {:?}", default
                );
                default
            }
            None => default,
        }
    }

    fn effective_max_beacon_size(&self, attributes: &ResponseAttributes) -> usize {
        let default = self.sender_settings.default_max_beacon_size;
        match attributes.max_beacon_size_if_set() {
            Some(bytes) if bytes > 0 => bytes as usize,
            Some(bytes) => {
                warn!(
                    max_beacon_size = bytes,
                    "ignoring non-positive max beacon size from collector; using {}", default
                );
                default
            }
            None => default,
        }
    }

    fn disable_capture(&self) {
        self.capture.store(false, Ordering::Release);
        self.sessions.clear();
    }

    /// Publishes a client for the new endpoint. Monitor name and server id are
    /// only committed once the client exists, so a failed build is retried by
    /// the next reply naming the same endpoint.
    fn rebuild_transport(&self, monitor_name: String, server_id: i32) {
        let configuration = HttpClientConfiguration {
            base_url: create_base_url(&self.client_config.endpoint_url, &monitor_name),
            application_id: self.client_config.application_id.clone(),
            server_id,
            verbose: self.client_config.verbose,
        };

        match self.provider.create_client(&configuration) {
            Ok(client) => {
                info!(
                    base_url = %configuration.base_url,
                    server_id = configuration.server_id,
                    "collector endpoint changed"
                );
                {
                    let mut transport = self.write_transport();
                    transport.configuration = Arc::new(configuration);
                    transport.client = Some(client);
                }
                let mut settings = self.write_settings();
                settings.monitor_name = monitor_name;
                settings.server_id = server_id;
            }
            Err(e) => warn!(
                base_url = %configuration.base_url,
                "keeping previous collector client: {e}"
            ),
        }
    }

    /// Returns the next session number, starting at 1.
    pub fn create_session_number(&self) -> i32 {
        self.session_number
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1)
    }

    /// Registers a session for flushing, unless capture is off.
    pub fn start_session(&self, session: SessionRef) {
        if self.is_capture() {
            self.sessions.register(session);
        }
    }

    /// Marks a session as finished and wakes the sender, unless capture is off.
    pub fn finish_session(&self, session: &SessionRef) {
        if self.is_capture() {
            self.sessions.finish(session);
        }
    }

    /// Creates a beacon with a fresh session number and registers it.
    pub fn open_beacon(&self) -> Arc<Beacon> {
        let session_number = self.create_session_number();
        let prefix = format!(
            "vv={}&va={}&ap={}&an={}&vi={}&sn={}&mp={}",
            BEACON_PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION"),
            self.client_config.application_id,
            self.client_config.application_name,
            self.client_config.visitor_id,
            session_number,
            self.multiplicity(),
        );
        let beacon = Arc::new(Beacon::new(session_number, prefix));
        self.start_session(beacon.clone());
        beacon
    }

    /// Stops the background sender and waits for it. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.lock_sender_task().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("beacon sender task failed: {e}");
            }
        }
        self.sender_status.set(SenderState::Shutdown);
    }

    /// Whether beacons are currently collected. Lock-free.
    pub fn is_capture(&self) -> bool {
        self.capture.load(Ordering::Acquire)
    }

    /// Whether crash reports are collected.
    pub fn is_capture_crashes(&self) -> bool {
        self.capture_crashes.load(Ordering::Acquire)
    }

    /// Whether errors are collected.
    pub fn is_capture_errors(&self) -> bool {
        self.capture_errors.load(Ordering::Acquire)
    }

    /// Sampling multiplicity written into new beacons.
    pub fn multiplicity(&self) -> i32 {
        self.multiplicity.load(Ordering::Acquire)
    }

    /// Interval between full flushes.
    pub fn send_interval(&self) -> Duration {
        self.read_settings().send_interval
    }

    /// Largest chunk, in bytes, sent in one beacon request.
    pub fn max_beacon_size(&self) -> usize {
        self.read_settings().max_beacon_size
    }

    /// Monitor name of the published endpoint.
    pub fn monitor_name(&self) -> String {
        self.read_settings().monitor_name.clone()
    }

    /// Server id of the published endpoint.
    pub fn server_id(&self) -> i32 {
        self.read_settings().server_id
    }

    /// Every attribute the collector has sent so far, later replies winning.
    pub fn server_attributes(&self) -> ResponseAttributes {
        self.read_settings().server_attributes.clone()
    }

    /// Configuration of the client requests currently go through.
    pub fn http_client_configuration(&self) -> Arc<HttpClientConfiguration> {
        Arc::clone(&self.read_transport().configuration)
    }

    /// URL beacons and status requests are sent to.
    pub fn base_url(&self) -> String {
        self.read_transport().configuration.base_url.clone()
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn sender_settings(&self) -> &SenderSettings {
        &self.sender_settings
    }

    /// Current state of the background sender.
    pub fn sender_state(&self) -> SenderState {
        self.sender_status.get()
    }

    /// Sessions waiting to be flushed.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The client currently published for the sender.
    pub(crate) fn http_client(&self) -> Result<Arc<dyn HttpClient>, TransportError> {
        self.read_transport()
            .client
            .clone()
            .ok_or_else(|| TransportError::ClientBuild("collector client not built yet".into()))
    }

    fn read_settings(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_settings(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_transport(&self) -> std::sync::RwLockReadGuard<'_, Transport> {
        self.transport.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_transport(&self) -> std::sync::RwLockWriteGuard<'_, Transport> {
        self.transport.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sender_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sender_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("client_config", &self.client_config)
            .field("capture", &self.is_capture())
            .field("settings", &*self.read_settings())
            .field("sessions", &self.sessions)
            .field("state", &self.sender_state())
            .finish()
    }
}

/// Joins endpoint and monitor name with exactly one `/` unless either side already carries one.
pub fn create_base_url(endpoint_url: &str, monitor_name: &str) -> String {
    if endpoint_url.ends_with('/') || monitor_name.starts_with('/') {
        format!("{endpoint_url}{monitor_name}")
    } else {
        format!("{endpoint_url}/{monitor_name}")
    }
}
