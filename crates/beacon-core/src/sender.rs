// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background sender.
//!
//! One task per client owns every collector round-trip after initialization.
//! It alternates between a capturing loop, which flushes sessions at the send
//! interval (and early for finished sessions), and a not-capturing loop, which
//! polls the collector until capture is switched back on. Every reply is
//! applied to the [`ConfigurationStore`] as soon as it arrives.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::configuration::{ConfigurationStore, InitError};
use crate::http::{BackoffState, RawResponse};
use crate::response::{parse_response, StatusResponse};
use crate::session::SessionRef;

/// Lifecycle of the background sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenderState {
    Uninitialized = 0,
    Handshaking = 1,
    Capturing = 2,
    NotCapturing = 3,
    Shutdown = 4,
}

impl SenderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SenderState::Uninitialized,
            1 => SenderState::Handshaking,
            2 => SenderState::Capturing,
            3 => SenderState::NotCapturing,
            _ => SenderState::Shutdown,
        }
    }
}

/// Shared view of the sender's state. `Shutdown` is terminal.
#[derive(Debug, Default)]
pub struct SenderStatus {
    state: AtomicU8,
}

impl SenderStatus {
    pub fn get(&self) -> SenderState {
        SenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SenderState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != SenderState::Shutdown as u8).then_some(state as u8)
            });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushOutcome {
    Completed,
    Failed,
    CaptureDisabled,
    Interrupted,
}

/// Drives the handshake and the capture loops for one [`ConfigurationStore`].
pub struct BeaconSender {
    store: Arc<ConfigurationStore>,
    status: Arc<SenderStatus>,
    shutdown: CancellationToken,
    backoff: BackoffState,
    retry_after: Option<Duration>,
    draining: bool,
}

impl BeaconSender {
    pub(crate) fn new(
        store: Arc<ConfigurationStore>,
        status: Arc<SenderStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        let backoff = BackoffState::new(store.sender_settings().handshake_backoff);
        Self {
            store,
            status,
            shutdown,
            backoff,
            retry_after: None,
            draining: false,
        }
    }

    pub fn state(&self) -> SenderState {
        self.status.get()
    }

    /// Repeats the status request until the collector answers or shutdown is requested.
    pub(crate) async fn handshake(&mut self) -> Result<(), InitError> {
        self.status.set(SenderState::Handshaking);
        let result = self.handshake_loop().await;
        match &result {
            Ok(()) if self.store.is_capture() => self.status.set(SenderState::Capturing),
            Ok(()) => self.status.set(SenderState::NotCapturing),
            Err(e) => {
                warn!("beacon sender handshake aborted: {e}");
                self.status.set(SenderState::Shutdown);
            }
        }
        result
    }

    async fn handshake_loop(&mut self) -> Result<(), InitError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(InitError::Shutdown);
            }

            let client = self.store.http_client()?;
            let sent = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(InitError::Shutdown),
                sent = client.send_status_request() => sent,
            };

            let delay = match sent {
                Ok(raw) => match decode(raw) {
                    Some(response) if response.is_too_many_requests() => {
                        warn!(
                            retry_after = ?response.retry_after(),
                            "collector throttled handshake"
                        );
                        response.retry_after()
                    }
                    response => {
                        self.backoff.register_success();
                        self.store.apply_response(response.as_ref());
                        return Ok(());
                    }
                },
                Err(e) if e.is_retryable() => {
                    let delay = self.backoff.register_error();
                    warn!(
                        attempt = self.backoff.error_count(),
                        delay = ?delay,
                        "handshake request failed: {e}"
                    );
                    delay
                }
                Err(e) => return Err(e.into()),
            };

            if !self.wait(delay).await {
                return Err(InitError::Shutdown);
            }
        }
    }

    /// Main loop, run on its own task after a successful handshake.
    pub(crate) async fn run(mut self) {
        let mut next_full_flush = Instant::now() + self.store.send_interval();

        loop {
            match self.status.get() {
                SenderState::Capturing => {
                    let deadline_reached = tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = sleep_until(next_full_flush) => true,
                        _ = self.store.sessions().finished_notified() => false,
                    };
                    // Early wake-ups never postpone an overdue full pass.
                    let full_flush = deadline_reached || Instant::now() >= next_full_flush;

                    let outcome = if full_flush {
                        next_full_flush = Instant::now() + self.store.send_interval();
                        self.flush_all().await
                    } else {
                        self.flush_finished().await
                    };

                    if outcome == FlushOutcome::Interrupted {
                        continue;
                    }
                    if outcome == FlushOutcome::CaptureDisabled || !self.store.is_capture() {
                        info!("collector disabled capture; discarding pending sessions");
                        self.store.sessions().clear();
                        self.status.set(SenderState::NotCapturing);
                    }
                }
                SenderState::NotCapturing => {
                    let delay = self
                        .retry_after
                        .take()
                        .unwrap_or_else(|| self.store.send_interval());
                    if !self.wait(delay).await {
                        break;
                    }
                    if self.poll_status().await {
                        info!("collector enabled capture");
                        next_full_flush = Instant::now() + self.store.send_interval();
                        self.status.set(SenderState::Capturing);
                    }
                }
                _ => break,
            }
        }

        self.final_flush().await;
        self.status.set(SenderState::Shutdown);
        debug!("beacon sender stopped");
    }

    /// Sleeps for `delay`; returns `false` if shutdown was requested first.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    /// Sends a status request while capture is off; returns whether capture is back on.
    async fn poll_status(&mut self) -> bool {
        let client = match self.store.http_client() {
            Ok(client) => client,
            Err(e) => {
                warn!("no collector client available: {e}");
                return false;
            }
        };
        let sent = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return false,
            sent = client.send_status_request() => sent,
        };

        match sent {
            Ok(raw) => {
                let response = decode(raw);
                self.remember_retry_after(response.as_ref());
                self.store.apply_response(response.as_ref());
                self.store.is_capture()
            }
            Err(e) => {
                warn!("status request failed: {e}");
                false
            }
        }
    }

    /// Finished sessions only; fully sent sessions leave the registry.
    async fn flush_finished(&mut self) -> FlushOutcome {
        for session in self.store.sessions().finished_snapshot() {
            match self.flush_session(&session).await {
                FlushOutcome::Completed => self.store.sessions().remove_finished(&session),
                FlushOutcome::Failed => {}
                outcome => return outcome,
            }
        }
        FlushOutcome::Completed
    }

    /// Finished sessions first, then open sessions with pending data.
    async fn flush_all(&mut self) -> FlushOutcome {
        match self.flush_finished().await {
            outcome @ (FlushOutcome::CaptureDisabled | FlushOutcome::Interrupted) => {
                return outcome
            }
            FlushOutcome::Completed | FlushOutcome::Failed => {}
        }
        for session in self.store.sessions().open_snapshot() {
            if !session.has_pending_data() {
                continue;
            }
            match self.flush_session(&session).await {
                outcome @ (FlushOutcome::CaptureDisabled | FlushOutcome::Interrupted) => {
                    return outcome
                }
                FlushOutcome::Completed | FlushOutcome::Failed => {}
            }
        }
        FlushOutcome::Completed
    }

    async fn flush_session(&mut self, session: &SessionRef) -> FlushOutcome {
        let session_number = session.session_number();

        loop {
            let client = match self.store.http_client() {
                Ok(client) => client,
                Err(e) => {
                    warn!(session = session_number, "no collector client available: {e}");
                    return FlushOutcome::Failed;
                }
            };
            let Some(chunk) = session.next_chunk(self.store.max_beacon_size()) else {
                return FlushOutcome::Completed;
            };
            let chunk_len = chunk.len();

            let sent = if self.draining {
                client.send_beacon_request(chunk).await
            } else {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {
                        session.reset_chunk();
                        return FlushOutcome::Interrupted;
                    }
                    sent = client.send_beacon_request(chunk) => sent,
                }
            };

            match sent {
                Ok(raw) => {
                    let response = decode(raw);
                    match response.as_ref() {
                        Some(response) if !response.is_erroneous() => {
                            debug!(session = session_number, bytes = chunk_len, "beacon chunk sent");
                            session.mark_chunk_sent();
                        }
                        _ => session.reset_chunk(),
                    }
                    self.remember_retry_after(response.as_ref());
                    self.store.apply_response(response.as_ref());
                    if !self.store.is_capture() {
                        return FlushOutcome::CaptureDisabled;
                    }
                }
                Err(e) => {
                    session.reset_chunk();
                    warn!(
                        session = session_number,
                        "beacon send failed; retrying next cycle: {e}"
                    );
                    return FlushOutcome::Failed;
                }
            }
        }
    }

    /// Best-effort flush bounded by one send interval.
    async fn final_flush(&mut self) {
        if self.status.get() != SenderState::Capturing || !self.store.is_capture() {
            return;
        }

        self.draining = true;
        let budget = self.store.send_interval();
        debug!(budget = ?budget, "flushing sessions before shutdown");
        if timeout(budget, self.flush_all()).await.is_err() {
            warn!(budget = ?budget, "final flush timed out; dropping remaining beacon data");
        }
    }

    fn remember_retry_after(&mut self, response: Option<&StatusResponse>) {
        if let Some(response) = response.filter(|response| response.is_too_many_requests()) {
            warn!(
                retry_after = ?response.retry_after(),
                "collector throttled beacon sender"
            );
            self.retry_after = Some(response.retry_after());
        }
    }
}

impl std::fmt::Debug for BeaconSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconSender")
            .field("state", &self.state())
            .field("backoff", &self.backoff)
            .field("retry_after", &self.retry_after)
            .field("draining", &self.draining)
            .finish()
    }
}

/// Decodes a reply, logging rejections and malformed bodies distinctly.
fn decode(raw: RawResponse) -> Option<StatusResponse> {
    match parse_response(raw.status, &raw.body, &raw.headers) {
        Ok(response) => {
            if response.is_erroneous() && !response.is_too_many_requests() {
                warn!(status = response.status_code(), "collector rejected request");
            }
            Some(response)
        }
        Err(e) => {
            warn!(status = raw.status, "malformed collector response: {e}");
            None
        }
    }
}
