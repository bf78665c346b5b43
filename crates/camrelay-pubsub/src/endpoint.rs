//! Websocket endpoint resolution for a socket.io origin.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{PubSubError, Result};

/// Engine.IO protocol revision spoken on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EngineIoVersion {
    /// Engine.IO 3 (socket.io 2.x servers). The client drives the heartbeat.
    V3,
    /// Engine.IO 4 (socket.io 3+/4 servers). The server drives the heartbeat.
    #[default]
    V4,
}

impl EngineIoVersion {
    /// Whether the client is responsible for sending pings.
    pub fn client_pings(self) -> bool {
        self == Self::V3
    }
}

impl TryFrom<u8> for EngineIoVersion {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            other => Err(format!("unsupported Engine.IO version {other}")),
        }
    }
}

impl From<EngineIoVersion> for u8 {
    fn from(value: EngineIoVersion) -> Self {
        match value {
            EngineIoVersion::V3 => 3,
            EngineIoVersion::V4 => 4,
        }
    }
}

impl fmt::Display for EngineIoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Where to connect and which namespace to join.
///
/// A path on the origin is part of the namespace, as with `io(origin + namespace)`:
/// `http://host:8000/base` + `/cam` joins `/base/cam` on `ws://host:8000/socket.io/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Websocket URL including the Engine.IO query.
    pub url: String,
    /// Socket.IO namespace.
    pub namespace: String,
}

impl Endpoint {
    /// Resolve an origin and namespace.
    ///
    /// The origin must be an absolute `http(s)` or `ws(s)` URL with a host
    /// and no query or fragment.
    pub fn parse(origin: &str, namespace: &str, version: EngineIoVersion) -> Result<Self> {
        let invalid = || PubSubError::InvalidUrl(origin.to_owned());

        let mut url = Url::parse(origin).map_err(|_| invalid())?;
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid());
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid());
        }
        let ws_scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return Err(invalid()),
        };

        let mut full = String::new();
        for segment in [url.path(), namespace] {
            let trimmed = segment.trim_matches('/');
            if !trimmed.is_empty() {
                full.push('/');
                full.push_str(trimmed);
            }
        }
        if full.is_empty() {
            full.push('/');
        }

        url.set_scheme(ws_scheme).map_err(|()| invalid())?;
        url.set_path("/socket.io/");
        url.set_query(Some(&format!("EIO={version}&transport=websocket")));

        Ok(Self {
            url: url.into(),
            namespace: full,
        })
    }
}
