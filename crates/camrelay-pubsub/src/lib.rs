//! # camrelay-pubsub
//!
//! The publish/subscribe transport the relay listens on: a socket.io client
//! speaking Engine.IO over a `tokio-tungstenite` websocket.
//!
//! - [`PubSubTransport`]: `subscribe(namespace)` seam used by the relay
//! - [`Subscription`]: lazy stream of [`TransportEvent`]s plus an idempotent close
//! - [`SocketIoTransport`]: the websocket implementation, with heartbeat and
//!   reconnection handled here rather than by the relay
//! - [`packet`]: Engine.IO / Socket.IO text packet codec

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod endpoint;
pub mod errors;
pub mod packet;
pub mod subscription;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backoff::ReconnectConfig;
pub use client::{SocketIoConfig, SocketIoTransport};
pub use endpoint::{EngineIoVersion, Endpoint};
pub use errors::{PubSubError, Result};
pub use subscription::{EventStream, PubSubTransport, Subscription, SubscriptionCloser, TransportEvent};
