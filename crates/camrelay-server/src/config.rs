//! Relay configuration with environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelayConfig::default()`]
//! 2. Apply `CAMRELAY_*` environment overrides ([`apply_env_overrides`])
//! 3. The binary applies command-line arguments last

use std::time::Duration;

use camrelay_core::constants::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT, DEFAULT_NAMESPACE, DEFAULT_ORIGIN, DEFAULT_PORT,
};
use camrelay_core::{RelayError, Result};
use camrelay_pubsub::{EngineIoVersion, ReconnectConfig, SocketIoConfig};
use serde::{Deserialize, Serialize};

/// Configuration for the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Base URL of the camera pub/sub server; also prefixed to frame paths.
    pub origin: String,
    /// Pub/sub namespace carrying `preview` events.
    pub namespace: String,
    /// Host to bind the query endpoint on.
    pub host: String,
    /// Port to bind the query endpoint on (`0` for auto-assign).
    pub port: u16,
    /// Log every frame update.
    pub debug: bool,
    /// Idle countdown in milliseconds; `None` runs until killed.
    pub idle_timeout_ms: Option<u64>,
    /// Engine.IO revision of the pub/sub server.
    pub engine_io: EngineIoVersion,
    /// Pub/sub reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for RelayConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.into(),
            namespace: DEFAULT_NAMESPACE.into(),
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            debug: false,
            idle_timeout_ms: Some(DEFAULT_IDLE_TIMEOUT.as_millis() as u64),
            engine_io: EngineIoVersion::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Idle countdown, if the relay should stop itself.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Transport configuration derived from this config.
    pub fn socket_io(&self) -> SocketIoConfig {
        SocketIoConfig {
            engine_io: self.engine_io,
            reconnect: self.reconnect.clone(),
            ..SocketIoConfig::new(self.origin.clone())
        }
    }

    /// Reject values the relay cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.origin.trim().is_empty() {
            return Err(RelayError::InvalidConfig("origin is empty".into()));
        }
        if self.host.trim().is_empty() {
            return Err(RelayError::InvalidConfig("host is empty".into()));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(RelayError::InvalidConfig(
                "idle timeout must be positive (use always-on instead)".into(),
            ));
        }
        Ok(())
    }
}

/// Apply `CAMRELAY_*` environment variables to `config`.
pub fn apply_env_overrides(config: &mut RelayConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

/// Apply overrides from any key lookup (the environment in production).
///
/// Invalid values are ignored with a warning, keeping the previous value.
pub fn apply_overrides(config: &mut RelayConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = get("CAMRELAY_ORIGIN") {
        config.origin = v;
    }
    if let Some(v) = get("CAMRELAY_NAMESPACE") {
        config.namespace = v;
    }
    if let Some(v) = get("CAMRELAY_HOST") {
        config.host = v;
    }
    if let Some(v) = get("CAMRELAY_PORT") {
        match v.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => warn_invalid("CAMRELAY_PORT", &v),
        }
    }
    if let Some(v) = get("CAMRELAY_DEBUG") {
        match parse_bool(&v) {
            Some(debug) => config.debug = debug,
            None => warn_invalid("CAMRELAY_DEBUG", &v),
        }
    }
    if let Some(v) = get("CAMRELAY_IDLE_TIMEOUT_MS") {
        match parse_u64_range(&v, 1, 86_400_000) {
            Some(ms) => config.idle_timeout_ms = Some(ms),
            None => warn_invalid("CAMRELAY_IDLE_TIMEOUT_MS", &v),
        }
    }
    if let Some(v) = get("CAMRELAY_ALWAYS_ON") {
        match parse_bool(&v) {
            Some(true) => config.idle_timeout_ms = None,
            Some(false) => {}
            None => warn_invalid("CAMRELAY_ALWAYS_ON", &v),
        }
    }
    if let Some(v) = get("CAMRELAY_EIO") {
        match v.parse::<u8>().ok().and_then(|n| EngineIoVersion::try_from(n).ok()) {
            Some(version) => config.engine_io = version,
            None => warn_invalid("CAMRELAY_EIO", &v),
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}
