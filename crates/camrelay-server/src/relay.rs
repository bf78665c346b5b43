//! Wiring and ordered teardown.
//!
//! Startup subscribes to the frame namespace, then binds the listener (which
//! arms the idle countdown). Once the shutdown token fires the listener is
//! closed first and the subscriber second, so no query can observe a relay
//! that has already stopped listening for frames.

use std::net::SocketAddr;
use std::sync::Arc;

use camrelay_core::{LastFrame, Origin, RelayError, Result};
use camrelay_pubsub::{PubSubTransport, SocketIoTransport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::idle::IdleLifecycleManager;
use crate::server::RelayServer;
use crate::shutdown::{DEFAULT_DRAIN_TIMEOUT, ShutdownCoordinator, drain};
use crate::subscriber::EventSubscriber;

/// A relay ready to start.
pub struct Relay<T> {
    config: RelayConfig,
    transport: T,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Relay<SocketIoTransport> {
    /// Relay over the socket.io transport described by `config`.
    pub fn from_config(config: RelayConfig) -> Self {
        let transport = SocketIoTransport::new(config.socket_io());
        Self::new(config, transport)
    }
}

impl<T: PubSubTransport> Relay<T> {
    /// Relay over an arbitrary transport.
    pub fn new(config: RelayConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// The coordinator that stops this relay.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Subscribe and start listening.
    pub async fn start(self) -> Result<RunningRelay> {
        self.config.validate()?;

        let frames = Arc::new(LastFrame::new(Origin::new(&self.config.origin)));
        let subscription = self
            .transport
            .subscribe(&self.config.namespace)
            .await
            .map_err(|e| RelayError::Subscribe {
                namespace: self.config.namespace.clone(),
                reason: e.to_string(),
            })?;
        info!(
            origin = %self.config.origin,
            namespace = %self.config.namespace,
            "subscribing to frame notifications"
        );

        let subscriber_stop = CancellationToken::new();
        let subscriber =
            EventSubscriber::new(Arc::clone(&frames)).spawn(subscription, subscriber_stop.clone());

        let server = RelayServer::new(self.config, Arc::clone(&frames), Arc::clone(&self.shutdown));
        let listen = match server.listen().await {
            Ok(listen) => listen,
            Err(e) => {
                subscriber_stop.cancel();
                let _ = drain("subscriber", subscriber, DEFAULT_DRAIN_TIMEOUT).await;
                return Err(e);
            }
        };

        Ok(RunningRelay {
            addr: listen.addr,
            frames,
            idle: listen.idle,
            shutdown: self.shutdown,
            listener: listen.task,
            subscriber,
            subscriber_stop,
        })
    }

    /// Start and run until shut down.
    pub async fn run(self) -> Result<()> {
        self.start().await?.wait().await
    }
}

/// A started relay.
pub struct RunningRelay {
    addr: SocketAddr,
    frames: Arc<LastFrame>,
    idle: Option<Arc<IdleLifecycleManager>>,
    shutdown: Arc<ShutdownCoordinator>,
    listener: JoinHandle<Result<()>>,
    subscriber: JoinHandle<()>,
    subscriber_stop: CancellationToken,
}

impl RunningRelay {
    /// Address the query endpoint is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The shared frame cell.
    pub fn frames(&self) -> &Arc<LastFrame> {
        &self.frames
    }

    /// The idle countdown, if enabled.
    pub fn idle(&self) -> Option<&Arc<IdleLifecycleManager>> {
        self.idle.as_ref()
    }

    /// The coordinator that stops this relay.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Wait for shutdown, then close the listener and the subscriber in order.
    pub async fn wait(self) -> Result<()> {
        self.shutdown.token().cancelled().await;
        if let Some(idle) = &self.idle {
            idle.cancel();
        }

        let served = drain("listener", self.listener, DEFAULT_DRAIN_TIMEOUT).await;
        debug!("listener stopped");

        self.subscriber_stop.cancel();
        let _ = drain("subscriber", self.subscriber, DEFAULT_DRAIN_TIMEOUT).await;
        debug!("subscriber stopped");

        served.unwrap_or(Ok(()))
    }
}

impl std::fmt::Debug for RunningRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningRelay")
            .field("addr", &self.addr)
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}
