//! Engine.IO and Socket.IO text packet codec.
//!
//! Engine.IO frames every websocket text message as `<type><payload>`.
//! Socket.IO packets travel inside Engine.IO `message` packets as
//! `<type>[<attachments>-][<namespace>,][<ack id>][<json>]`.
//! Binary packets are recognised but their attachments are not reassembled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{PubSubError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Engine.IO
// ─────────────────────────────────────────────────────────────────────────────

/// Handshake sent by the server in the Engine.IO `open` packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the session may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Heartbeat interval in milliseconds.
    pub ping_interval: u64,
    /// Heartbeat timeout in milliseconds.
    pub ping_timeout: u64,
    /// Maximum payload size, when advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// An Engine.IO packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnginePacket {
    /// `0`: session opened.
    Open(Handshake),
    /// `1`: session closed.
    Close,
    /// `2`: heartbeat ping.
    Ping(String),
    /// `3`: heartbeat pong.
    Pong(String),
    /// `4`: message carrying a Socket.IO packet.
    Message(String),
    /// `5`: transport upgrade.
    Upgrade,
    /// `6`: no-op.
    Noop,
}

impl EnginePacket {
    /// Decode a websocket text frame.
    pub fn decode(text: &str) -> Result<Self> {
        let (kind, rest) = split_type(text)?;
        match kind {
            0 => Ok(Self::Open(serde_json::from_str(rest)?)),
            1 => Ok(Self::Close),
            2 => Ok(Self::Ping(rest.to_owned())),
            3 => Ok(Self::Pong(rest.to_owned())),
            4 => Ok(Self::Message(rest.to_owned())),
            5 => Ok(Self::Upgrade),
            6 => Ok(Self::Noop),
            other => Err(PubSubError::Protocol(format!("unknown engine packet type {other}"))),
        }
    }

    /// Encode into a websocket text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            Self::Close => "1".into(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".into(),
            Self::Noop => "6".into(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket.IO
// ─────────────────────────────────────────────────────────────────────────────

/// A Socket.IO packet.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    /// `0`: join a namespace (client) or confirm the join (server).
    Connect {
        /// Namespace.
        nsp: String,
        /// Optional auth (client) or `{sid}` (server).
        data: Option<Value>,
    },
    /// `1`: leave a namespace.
    Disconnect {
        /// Namespace.
        nsp: String,
    },
    /// `2`: named event; `data` is the JSON array `[name, ...args]`.
    Event {
        /// Namespace.
        nsp: String,
        /// Acknowledgement id, if the sender wants one.
        id: Option<u64>,
        /// Event array.
        data: Value,
    },
    /// `3`: acknowledgement.
    Ack {
        /// Namespace.
        nsp: String,
        /// Acknowledgement id.
        id: Option<u64>,
        /// Acknowledgement arguments.
        data: Value,
    },
    /// `4`: namespace join refused.
    ConnectError {
        /// Namespace.
        nsp: String,
        /// Error payload.
        data: Option<Value>,
    },
    /// `5`/`6`: binary event or ack; attachments are not supported.
    Binary {
        /// Namespace.
        nsp: String,
    },
}

/// Default namespace.
pub const ROOT_NAMESPACE: &str = "/";

impl SocketPacket {
    /// Namespace this packet belongs to.
    pub fn nsp(&self) -> &str {
        match self {
            Self::Connect { nsp, .. }
            | Self::Disconnect { nsp }
            | Self::Event { nsp, .. }
            | Self::Ack { nsp, .. }
            | Self::ConnectError { nsp, .. }
            | Self::Binary { nsp } => nsp,
        }
    }

    /// Event name and first argument, for `Event` packets.
    pub fn event(&self) -> Option<(&str, Value)> {
        let Self::Event { data, .. } = self else {
            return None;
        };
        let items = data.as_array()?;
        let name = items.first()?.as_str()?;
        Some((name, items.get(1).cloned().unwrap_or(Value::Null)))
    }

    /// Decode the payload of an Engine.IO `message` packet.
    pub fn decode(text: &str) -> Result<Self> {
        let (kind, mut rest) = split_type(text)?;

        if kind == 5 || kind == 6 {
            // attachment count, terminated by '-'
            let dash = rest
                .find('-')
                .ok_or_else(|| PubSubError::Protocol("binary packet without attachment count".into()))?;
            rest = &rest[dash + 1..];
        }

        let nsp = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let nsp = rest[..end].to_owned();
            rest = rest.get(end + 1..).unwrap_or_default();
            nsp
        } else {
            ROOT_NAMESPACE.to_owned()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|e| PubSubError::Protocol(format!("bad ack id: {e}")))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        match kind {
            0 => Ok(Self::Connect { nsp, data }),
            1 => Ok(Self::Disconnect { nsp }),
            2 => Ok(Self::Event {
                nsp,
                id,
                data: data.unwrap_or_else(|| Value::Array(Vec::new())),
            }),
            3 => Ok(Self::Ack {
                nsp,
                id,
                data: data.unwrap_or_else(|| Value::Array(Vec::new())),
            }),
            4 => Ok(Self::ConnectError { nsp, data }),
            5 | 6 => Ok(Self::Binary { nsp }),
            other => Err(PubSubError::Protocol(format!("unknown socket packet type {other}"))),
        }
    }

    /// Encode as the payload of an Engine.IO `message` packet.
    pub fn encode(&self) -> Result<String> {
        let (kind, id, data) = match self {
            Self::Connect { data, .. } => (0, None, data.as_ref()),
            Self::Disconnect { .. } => (1, None, None),
            Self::Event { id, data, .. } => (2, *id, Some(data)),
            Self::Ack { id, data, .. } => (3, *id, Some(data)),
            Self::ConnectError { data, .. } => (4, None, data.as_ref()),
            Self::Binary { .. } => {
                return Err(PubSubError::Protocol("binary packets cannot be encoded".into()));
            }
        };

        let mut out = kind.to_string();
        let nsp = self.nsp();
        if nsp != ROOT_NAMESPACE {
            out.push_str(nsp);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&serde_json::to_string(data)?);
        }
        Ok(out)
    }

    /// Wrap in an Engine.IO `message` packet and encode as a text frame.
    pub fn to_frame(&self) -> Result<String> {
        EnginePacket::Message(self.encode()?).encode()
    }
}

fn split_type(text: &str) -> Result<(u8, &str)> {
    match text.as_bytes().first() {
        Some(b) if b.is_ascii_digit() => Ok((b - b'0', &text[1..])),
        Some(_) => Err(PubSubError::Protocol(format!("packet type missing: {text:?}"))),
        None => Err(PubSubError::Protocol("empty packet".into())),
    }
}
