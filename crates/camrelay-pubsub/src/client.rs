//! socket.io client over `tokio-tungstenite`.
//!
//! One background task per subscription owns the websocket. It performs the
//! Engine.IO handshake, joins the namespace, answers (or, for Engine.IO 3,
//! sends) heartbeats, forwards events, and reconnects with back-off until the
//! subscription is closed.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectConfig;
use crate::endpoint::{Endpoint, EngineIoVersion};
use crate::errors::{PubSubError, Result};
use crate::packet::{EnginePacket, Handshake, SocketPacket};
use crate::subscription::{PubSubTransport, Subscription, SubscriptionCloser, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for [`SocketIoTransport`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketIoConfig {
    /// Origin of the socket.io server, e.g. `http://127.0.0.1:8000`.
    pub origin: String,
    /// Engine.IO protocol revision.
    pub engine_io: EngineIoVersion,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
    /// Capacity of the event channel between the connection task and the reader.
    pub event_buffer: usize,
    /// How long to wait for the websocket and the `open` packet.
    pub connect_timeout_ms: u64,
}

impl SocketIoConfig {
    /// Defaults for `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            engine_io: EngineIoVersion::default(),
            reconnect: ReconnectConfig::default(),
            event_buffer: 64,
            connect_timeout_ms: 20_000,
        }
    }
}

/// socket.io transport. Each `subscribe` opens its own connection.
#[derive(Clone, Debug)]
pub struct SocketIoTransport {
    config: SocketIoConfig,
}

impl SocketIoTransport {
    /// Create a transport.
    pub fn new(config: SocketIoConfig) -> Self {
        Self { config }
    }

    /// The transport configuration.
    pub fn config(&self) -> &SocketIoConfig {
        &self.config
    }
}

#[async_trait]
impl PubSubTransport for SocketIoTransport {
    async fn subscribe(&self, namespace: &str) -> Result<Subscription> {
        let endpoint = Endpoint::parse(&self.config.origin, namespace, self.config.engine_io)?;
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel = CancellationToken::new();

        debug!(url = %endpoint.url, namespace = %endpoint.namespace, "subscribing");
        let task = tokio::spawn(run_connection(
            endpoint,
            self.config.clone(),
            tx,
            cancel.clone(),
        ));

        Ok(Subscription::new(
            Box::pin(ReceiverStream::new(rx)),
            SubscriptionCloser::new(cancel, Some(task)),
        ))
    }
}

/// How a single websocket session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The subscription was closed locally.
    Closed,
    /// The event receiver went away.
    ReceiverDropped,
    /// The connection was lost; `joined` tells whether the namespace had been joined.
    Lost { reason: String, joined: bool },
}

/// Reconnect loop. Runs until the subscription is closed or attempts run out.
async fn run_connection(
    endpoint: Endpoint,
    config: SocketIoConfig,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        match run_session(&endpoint, &config, &tx, &cancel).await {
            Ok(SessionEnd::Closed | SessionEnd::ReceiverDropped) => return,
            Ok(SessionEnd::Lost { reason, joined }) => {
                if joined {
                    attempt = 0;
                }
                debug!(reason = %reason, "connection lost");
            }
            Err(e) => {
                warn!(url = %endpoint.url, error = %e, "connection failed");
            }
        }

        if !config.reconnect.allows(attempt) {
            warn!(attempts = attempt, "giving up on reconnection");
            return;
        }
        let delay = config.reconnect.delay(attempt);
        attempt += 1;
        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");

        tokio::select! {
            () = sleep(delay) => {}
            () = cancel.cancelled() => return,
        }
    }
}

/// Connect, handshake and pump one websocket session.
async fn run_session(
    endpoint: &Endpoint,
    config: &SocketIoConfig,
    tx: &mpsc::Sender<TransportEvent>,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

    let mut ws = tokio::select! {
        res = tokio::time::timeout(connect_timeout, connect_async(endpoint.url.as_str())) => {
            let (ws, _) = res.map_err(|_| PubSubError::Handshake("connect timed out".into()))??;
            ws
        }
        () = cancel.cancelled() => return Ok(SessionEnd::Closed),
    };

    let handshake = tokio::select! {
        res = tokio::time::timeout(connect_timeout, read_handshake(&mut ws)) => {
            res.map_err(|_| PubSubError::Handshake("no open packet".into()))??
        }
        () = cancel.cancelled() => {
            let _ = ws.close(None).await;
            return Ok(SessionEnd::Closed);
        }
    };
    debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine.io session open");

    let join = SocketPacket::Connect {
        nsp: endpoint.namespace.clone(),
        data: None,
    };
    ws.send(Message::Text(join.to_frame()?.into())).await?;

    let mut session = Session {
        ws,
        namespace: endpoint.namespace.as_str(),
        tx,
        joined: false,
    };
    let end = session.pump(&handshake, config.engine_io, cancel).await;

    if session.joined {
        let reason = match &end {
            Ok(SessionEnd::Lost { reason, .. }) => reason.clone(),
            Ok(_) => "io client disconnect".to_owned(),
            Err(e) => e.to_string(),
        };
        // The reader may already be gone; nothing to report to then.
        let _ = tx.try_send(TransportEvent::Disconnected { reason });
    }
    end
}

/// Wait for the Engine.IO `open` packet.
async fn read_handshake(ws: &mut WsStream) -> Result<Handshake> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => match EnginePacket::decode(text.as_str())? {
                EnginePacket::Open(handshake) => return Ok(handshake),
                other => {
                    return Err(PubSubError::Handshake(format!("expected open, got {other:?}")));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(PubSubError::Handshake("connection closed before open".into()))
}

struct Session<'a> {
    ws: WsStream,
    namespace: &'a str,
    tx: &'a mpsc::Sender<TransportEvent>,
    joined: bool,
}

impl Session<'_> {
    async fn pump(
        &mut self,
        handshake: &Handshake,
        version: EngineIoVersion,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        let ping_interval = Duration::from_millis(handshake.ping_interval);
        let liveness = ping_interval + Duration::from_millis(handshake.ping_timeout);
        let mut deadline = Instant::now() + liveness;
        let mut next_ping = Instant::now() + ping_interval;

        loop {
            let ping_at = next_ping;
            tokio::select! {
                () = cancel.cancelled() => {
                    if self.joined {
                        let leave = SocketPacket::Disconnect { nsp: self.namespace.to_owned() };
                        let _ = self.ws.send(Message::Text(leave.to_frame()?.into())).await;
                    }
                    let _ = self.ws.close(None).await;
                    return Ok(SessionEnd::Closed);
                }
                () = sleep_until(deadline) => {
                    return Ok(self.lost("ping timeout"));
                }
                () = sleep_until(ping_at), if version.client_pings() => {
                    self.ws.send(Message::Text(EnginePacket::Ping(String::new()).encode()?.into())).await?;
                    next_ping = Instant::now() + ping_interval;
                }
                msg = self.ws.next() => {
                    let Some(msg) = msg else {
                        return Ok(self.lost("transport close"));
                    };
                    match msg {
                        Ok(Message::Text(text)) => {
                            deadline = Instant::now() + liveness;
                            if let Some(end) = self.on_text(text.as_str()).await? {
                                return Ok(end);
                            }
                        }
                        Ok(Message::Close(_)) => return Ok(self.lost("transport close")),
                        Ok(_) => {}
                        Err(e) => return Ok(self.lost(&format!("transport error: {e}"))),
                    }
                }
            }
        }
    }

    async fn on_text(&mut self, text: &str) -> Result<Option<SessionEnd>> {
        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "ignoring malformed engine.io packet");
                return Ok(None);
            }
        };

        match packet {
            EnginePacket::Ping(data) => {
                self.ws.send(Message::Text(EnginePacket::Pong(data).encode()?.into())).await?;
            }
            EnginePacket::Close => return Ok(Some(self.lost("server close"))),
            EnginePacket::Message(payload) => return self.on_socket_packet(&payload).await,
            EnginePacket::Pong(_) | EnginePacket::Open(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        Ok(None)
    }

    async fn on_socket_packet(&mut self, payload: &str) -> Result<Option<SessionEnd>> {
        let packet = match SocketPacket::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "ignoring malformed socket.io packet");
                return Ok(None);
            }
        };
        if packet.nsp() != self.namespace {
            return Ok(None);
        }

        let event = match &packet {
            SocketPacket::Connect { .. } => {
                if self.joined {
                    return Ok(None);
                }
                self.joined = true;
                TransportEvent::Connected
            }
            SocketPacket::Disconnect { .. } => {
                return Ok(Some(self.lost("io server disconnect")));
            }
            SocketPacket::ConnectError { data, .. } => {
                let reason = data
                    .as_ref()
                    .and_then(|d| d.get("message").and_then(|m| m.as_str()).map(str::to_owned))
                    .or_else(|| data.as_ref().map(ToString::to_string))
                    .unwrap_or_else(|| "unknown".to_owned());
                return Err(PubSubError::ConnectRejected {
                    namespace: self.namespace.to_owned(),
                    reason,
                });
            }
            SocketPacket::Event { .. } => match packet.event() {
                Some((name, payload)) => TransportEvent::Event {
                    name: name.to_owned(),
                    payload,
                },
                None => {
                    warn!("ignoring event packet without a name");
                    return Ok(None);
                }
            },
            SocketPacket::Binary { .. } => {
                debug!("ignoring binary packet");
                return Ok(None);
            }
            SocketPacket::Ack { .. } => return Ok(None),
        };

        if self.tx.send(event).await.is_err() {
            let _ = self.ws.close(None).await;
            return Ok(Some(SessionEnd::ReceiverDropped));
        }
        Ok(None)
    }

    fn lost(&self, reason: &str) -> SessionEnd {
        SessionEnd::Lost {
            reason: reason.to_owned(),
            joined: self.joined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSocketIoServer;
    use serde_json::json;

    fn config_for(server: &FakeSocketIoServer) -> SocketIoConfig {
        SocketIoConfig {
            reconnect: ReconnectConfig {
                base_delay_ms: 20,
                max_delay_ms: 50,
                ..ReconnectConfig::default()
            },
            ..SocketIoConfig::new(server.origin())
        }
    }

    async fn next_event(sub: &mut Subscription) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn joins_namespace_and_receives_preview() {
        let server = FakeSocketIoServer::start("/cam").await;
        let transport = SocketIoTransport::new(config_for(&server));
        let mut sub = transport.subscribe("/cam").await.unwrap();

        assert_eq!(next_event(&mut sub).await, TransportEvent::Connected);
        server.emit("preview", json!({"src": "/img/42.jpg"}));

        assert_eq!(
            next_event(&mut sub).await,
            TransportEvent::Event {
                name: "preview".into(),
                payload: json!({"src": "/img/42.jpg"}),
            }
        );
        assert!(sub.close().await);
        assert!(!sub.close().await);
    }

    #[tokio::test]
    async fn events_for_other_namespaces_are_ignored() {
        let server = FakeSocketIoServer::start("/cam").await;
        let transport = SocketIoTransport::new(config_for(&server));
        let mut sub = transport.subscribe("/cam").await.unwrap();
        assert_eq!(next_event(&mut sub).await, TransportEvent::Connected);

        server.emit_raw(r#"42/other,["preview",{"src":"/x.jpg"}]"#);
        server.emit("preview", json!({"src": "/y.jpg"}));

        let TransportEvent::Event { payload, .. } = next_event(&mut sub).await else {
            panic!("expected event");
        };
        assert_eq!(payload["src"], "/y.jpg");
        let _ = sub.close().await;
    }

    #[tokio::test]
    async fn malformed_packets_do_not_end_the_session() {
        let server = FakeSocketIoServer::start("/cam").await;
        let transport = SocketIoTransport::new(config_for(&server));
        let mut sub = transport.subscribe("/cam").await.unwrap();
        assert_eq!(next_event(&mut sub).await, TransportEvent::Connected);

        server.emit_raw("garbage");
        server.emit_raw("42/cam,[not json");
        server.emit("preview", json!({"src": "/ok.jpg"}));

        assert!(matches!(next_event(&mut sub).await, TransportEvent::Event { .. }));
        let _ = sub.close().await;
    }

    #[tokio::test]
    async fn reconnects_after_server_disconnect() {
        let server = FakeSocketIoServer::start("/cam").await;
        let transport = SocketIoTransport::new(config_for(&server));
        let mut sub = transport.subscribe("/cam").await.unwrap();
        assert_eq!(next_event(&mut sub).await, TransportEvent::Connected);

        server.disconnect_all();
        assert_eq!(
            next_event(&mut sub).await,
            TransportEvent::Disconnected {
                reason: "io server disconnect".into()
            }
        );
        assert_eq!(next_event(&mut sub).await, TransportEvent::Connected);
        assert!(server.connection_count() >= 2);
        let _ = sub.close().await;
    }

    #[tokio::test]
    async fn answers_server_pings() {
        let server = FakeSocketIoServer::start("/cam").await;
        let transport = SocketIoTransport::new(config_for(&server));
        let mut sub = transport.subscribe("/cam").await.unwrap();
        assert_eq!(next_event(&mut sub).await, TransportEvent::Connected);

        server.emit_raw("2");
        tokio::time::timeout(Duration::from_secs(5), server.wait_for_pong())
            .await
            .expect("no pong");
        let _ = sub.close().await;
    }

    #[tokio::test]
    async fn rejects_bad_origin_up_front() {
        let transport = SocketIoTransport::new(SocketIoConfig::new("not a url"));
        let err = transport.subscribe("/cam").await.unwrap_err();
        assert!(matches!(err, PubSubError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn gives_up_when_attempts_run_out() {
        // Nothing listens on this port once the listener is dropped.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = SocketIoConfig {
            reconnect: ReconnectConfig {
                base_delay_ms: 1,
                max_delay_ms: 2,
                max_attempts: Some(1),
                ..ReconnectConfig::default()
            },
            ..SocketIoConfig::new(format!("http://127.0.0.1:{port}"))
        };
        let mut sub = SocketIoTransport::new(config).subscribe("/cam").await.unwrap();
        let ended = tokio::time::timeout(Duration::from_secs(5), sub.next()).await.unwrap();
        assert_eq!(ended, None);
    }
}
