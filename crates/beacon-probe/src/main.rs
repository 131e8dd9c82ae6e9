// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use beacon_core::{BeaconSession, ClientEnv, ConfigurationStore, SenderSettings, SessionRef};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let log_level = env::var("BEACON_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&log_level)?;
    debug!("Logging subsystem enabled");

    let send_probe = env::var("BEACON_PROBE_SEND")
        .map(|val| val.to_lowercase() != "false")
        .unwrap_or(true);
    let handshake_timeout = env::var("BEACON_PROBE_TIMEOUT_SECS")
        .ok()
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT);

    let client_config = ClientEnv::from_os_env()
        .to_client_config()
        .context("invalid beacon client environment")?;
    info!(
        endpoint = %client_config.endpoint_url,
        application_id = %client_config.application_id,
        deployment = %client_config.deployment,
        "starting collector probe"
    );

    let store = ConfigurationStore::new(client_config, SenderSettings::default());
    match timeout(handshake_timeout, store.initialize()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            store.shutdown().await;
            return Err(e).context("collector handshake failed");
        }
        Err(_) => {
            store.shutdown().await;
            bail!("collector did not answer within {handshake_timeout:?}");
        }
    }

    let attributes = store.server_attributes();
    info!(
        capture = store.is_capture(),
        capture_crashes = store.is_capture_crashes(),
        capture_errors = store.is_capture_errors(),
        multiplicity = store.multiplicity(),
        base_url = %store.base_url(),
        server_id = store.server_id(),
        send_interval = ?store.send_interval(),
        max_beacon_size = store.max_beacon_size(),
        "effective configuration"
    );
    for attribute in attributes.set_attributes().iter() {
        debug!(%attribute, "collector sent attribute");
    }

    if !send_probe {
        store.shutdown().await;
        return Ok(());
    }
    if !store.is_capture() {
        warn!("collector disabled capture; skipping probe beacon");
        store.shutdown().await;
        return Ok(());
    }

    let beacon = store.open_beacon();
    beacon.add_event("et=1&na=beacon-probe&it=0&pa=0&s0=1&t0=0");
    let session: SessionRef = beacon.clone();
    store.finish_session(&session);
    store.shutdown().await;

    if beacon.has_pending_data() {
        return Err(anyhow!(
            "probe beacon for session {} was not delivered",
            beacon.session_number()
        ));
    }
    info!(session = beacon.session_number(), "probe beacon delivered");
    Ok(())
}

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in configuration")?,
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}
