//! In-process socket.io server for tests.
//!
//! Speaks just enough Engine.IO 4 over an axum websocket to exercise the
//! client: sends the `open` handshake, confirms namespace joins, pushes
//! frames on demand, and records pongs and namespace leaves.

#![allow(clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

use crate::packet::{EnginePacket, Handshake, SocketPacket};

#[derive(Clone)]
struct FakeState {
    namespace: String,
    outbound: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
    leaves: Arc<AtomicUsize>,
    pongs: Arc<Notify>,
}

/// A fake socket.io server bound to an ephemeral local port.
pub struct FakeSocketIoServer {
    addr: SocketAddr,
    state: FakeState,
    task: JoinHandle<()>,
}

impl FakeSocketIoServer {
    /// Start a server that accepts joins on `namespace`.
    pub async fn start(namespace: &str) -> Self {
        let (outbound, _) = broadcast::channel(64);
        let state = FakeState {
            namespace: namespace.to_owned(),
            outbound,
            connections: Arc::new(AtomicUsize::new(0)),
            leaves: Arc::new(AtomicUsize::new(0)),
            pongs: Arc::new(Notify::new()),
        };

        let router = Router::new()
            .route("/socket.io/", get(ws_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake socket.io server");
        let addr = listener.local_addr().expect("fake server address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state, task }
    }

    /// `http://` origin of this server.
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Emit a named event with one argument on the namespace.
    pub fn emit(&self, name: &str, payload: Value) {
        let packet = SocketPacket::Event {
            nsp: self.state.namespace.clone(),
            id: None,
            data: json!([name, payload]),
        };
        self.emit_raw(&packet.to_frame().expect("encode event"));
    }

    /// Push a raw websocket text frame to every connected client.
    pub fn emit_raw(&self, frame: &str) {
        let _ = self.state.outbound.send(frame.to_owned());
    }

    /// Kick every client out of the namespace.
    pub fn disconnect_all(&self) {
        let leave = SocketPacket::Disconnect {
            nsp: self.state.namespace.clone(),
        };
        self.emit_raw(&leave.to_frame().expect("encode disconnect"));
    }

    /// Number of websocket connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` packets clients have sent for the namespace.
    pub fn leave_count(&self) -> usize {
        self.state.leaves.load(Ordering::SeqCst)
    }

    /// Resolve once a client has answered a ping.
    pub async fn wait_for_pong(&self) {
        self.state.pongs.notified().await;
    }
}

impl Drop for FakeSocketIoServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<FakeState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: FakeState) {
    let n = state.connections.fetch_add(1, Ordering::SeqCst);
    let mut outbound = state.outbound.subscribe();

    let open = EnginePacket::Open(Handshake {
        sid: format!("fake-{n}"),
        upgrades: Vec::new(),
        ping_interval: 25_000,
        ping_timeout: 20_000,
        max_payload: Some(1_000_000),
    });
    let Ok(open) = open.encode() else { return };
    if socket.send(Message::Text(open.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => {
                        if !on_client_text(&mut socket, &state, text.as_str(), n).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = outbound.recv() => {
                let Ok(frame) = frame else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn on_client_text(socket: &mut WebSocket, state: &FakeState, text: &str, n: usize) -> bool {
    match EnginePacket::decode(text) {
        Ok(EnginePacket::Pong(_)) => state.pongs.notify_one(),
        Ok(EnginePacket::Ping(data)) => {
            let Ok(pong) = EnginePacket::Pong(data).encode() else { return false };
            return socket.send(Message::Text(pong.into())).await.is_ok();
        }
        Ok(EnginePacket::Message(payload)) => match SocketPacket::decode(&payload) {
            Ok(SocketPacket::Connect { nsp, .. }) if nsp == state.namespace => {
                let ack = SocketPacket::Connect {
                    nsp,
                    data: Some(json!({ "sid": format!("fake-nsp-{n}") })),
                };
                let Ok(frame) = ack.to_frame() else { return false };
                return socket.send(Message::Text(frame.into())).await.is_ok();
            }
            Ok(SocketPacket::Disconnect { nsp }) if nsp == state.namespace => {
                let _ = state.leaves.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        },
        _ => {}
    }
    true
}
