//! # camrelay
//!
//! Camera frame relay binary: subscribes to `preview` notifications and
//! serves the latest frame URL on `GET /`.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use camrelay_core::logging::{init_subscriber, level_for};
use camrelay_pubsub::EngineIoVersion;
use camrelay_server::config::{apply_env_overrides, parse_bool};
use camrelay_server::{Relay, RelayConfig, ShutdownReason};
use clap::Parser;

/// Relay the latest camera frame URL over HTTP.
#[derive(Parser, Debug)]
#[command(name = "camrelay", about = "Relay the latest camera frame URL over HTTP")]
struct Cli {
    /// Origin of the camera pub/sub server (also prefixed to frame paths).
    origin: Option<String>,

    /// Pub/sub namespace carrying `preview` events.
    namespace: Option<String>,

    /// Port for the query endpoint.
    port: Option<u16>,

    /// Log every frame update (`true`, `1`, `yes`, `on`).
    debug: Option<String>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Stop after this many milliseconds without a query.
    #[arg(long, conflicts_with = "always_on")]
    idle_timeout_ms: Option<u64>,

    /// Never stop on idle.
    #[arg(long)]
    always_on: bool,

    /// Engine.IO revision of the pub/sub server (3 or 4).
    #[arg(long, value_parser = parse_eio)]
    eio: Option<EngineIoVersion>,
}

impl Cli {
    /// Overlay command-line values on `config`.
    fn apply(self, config: &mut RelayConfig) {
        if let Some(origin) = self.origin {
            config.origin = origin;
        }
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(debug) = self.debug {
            config.debug = parse_bool(&debug).unwrap_or(false);
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(ms) = self.idle_timeout_ms {
            config.idle_timeout_ms = Some(ms);
        }
        if self.always_on {
            config.idle_timeout_ms = None;
        }
        if let Some(eio) = self.eio {
            config.engine_io = eio;
        }
    }
}

fn parse_eio(value: &str) -> std::result::Result<EngineIoVersion, String> {
    let n: u8 = value.parse().map_err(|_| format!("not a number: {value}"))?;
    EngineIoVersion::try_from(n)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = RelayConfig::default();
    apply_env_overrides(&mut config);
    args.apply(&mut config);

    init_subscriber(level_for(config.debug));
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        origin = %config.origin,
        namespace = %config.namespace,
        port = config.port,
        debug = config.debug,
        idle_timeout_ms = config.idle_timeout_ms,
        "starting camera relay"
    );

    let relay = Relay::from_config(config);
    let shutdown = Arc::clone(relay.shutdown());
    let running = relay.start().await.context("Failed to start relay")?;
    tracing::info!("Camera relay listening on http://{}", running.addr());

    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.shutdown(ShutdownReason::Signal);
        }
    });

    running.wait().await.context("Relay stopped with an error")?;
    signal.abort();

    tracing::info!("Bye.");
    Ok(())
}
