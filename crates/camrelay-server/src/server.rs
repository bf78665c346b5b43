//! `RelayServer`: the Axum HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use camrelay_core::{LastFrame, RelayError, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RelayConfig;
use crate::idle::IdleLifecycleManager;
use crate::query::{self, QueryState};
use crate::shutdown::ShutdownCoordinator;

/// A bound, running listener.
#[derive(Debug)]
pub struct ListenHandle {
    /// Address actually bound (resolves port `0`).
    pub addr: SocketAddr,
    /// The idle countdown, armed as soon as the listener was bound.
    pub idle: Option<Arc<IdleLifecycleManager>>,
    /// Resolves once the listener has stopped after shutdown.
    pub task: JoinHandle<Result<()>>,
}

/// Serves `GET /` until the shutdown token fires.
pub struct RelayServer {
    config: RelayConfig,
    frames: Arc<LastFrame>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl RelayServer {
    /// Create a server over a shared frame cell.
    pub fn new(
        config: RelayConfig,
        frames: Arc<LastFrame>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config,
            frames,
            shutdown,
        }
    }

    /// Build the router, re-arming `idle` on every query.
    pub fn router(&self, idle: Option<Arc<IdleLifecycleManager>>) -> Router {
        query::router(QueryState {
            frames: Arc::clone(&self.frames),
            idle,
        })
    }

    /// Bind the listener and start serving in the background.
    ///
    /// The idle countdown (if configured) starts once the port is bound.
    pub async fn listen(&self) -> Result<ListenHandle> {
        let bind = self.config.bind_addr();
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| RelayError::Bind {
                addr: bind.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind { addr: bind, source })?;

        let idle = self
            .config
            .idle_timeout()
            .map(|timeout| IdleLifecycleManager::start(timeout, Arc::clone(&self.shutdown)));
        let router = self.router(idle.clone());
        let token = self.shutdown.token();

        info!(%addr, idle_timeout_ms = self.config.idle_timeout_ms, "listening");
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .map_err(|source| RelayError::Serve { addr, source })?;
            info!(%addr, "listener closed");
            Ok(())
        });

        Ok(ListenHandle { addr, idle, task })
    }

    /// The server configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use camrelay_core::Origin;

    use crate::idle::IdleState;
    use crate::shutdown::ShutdownReason;

    fn make_server(idle_timeout_ms: Option<u64>) -> RelayServer {
        let config = RelayConfig {
            host: "127.0.0.1".into(),
            port: 0,
            idle_timeout_ms,
            ..RelayConfig::default()
        };
        RelayServer::new(
            config,
            Arc::new(LastFrame::new(Origin::new("http://cam:8000"))),
            Arc::new(ShutdownCoordinator::new()),
        )
    }

    #[tokio::test]
    async fn listen_resolves_ephemeral_port() {
        let server = make_server(None);
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.addr.port(), 0);
        assert!(handle.idle.is_none());

        let _ = server.shutdown().shutdown(ShutdownReason::Signal);
        assert_matches!(handle.task.await, Ok(Ok(())));
    }

    #[tokio::test]
    async fn listen_arms_idle_countdown() {
        let server = make_server(Some(60_000));
        let handle = server.listen().await.unwrap();
        let idle = handle.idle.as_ref().unwrap();
        assert_eq!(idle.state(), IdleState::Armed);
        assert_eq!(idle.timeout(), Duration::from_secs(60));

        let _ = server.shutdown().shutdown(ShutdownReason::Signal);
        assert_matches!(handle.task.await, Ok(Ok(())));
    }

    #[tokio::test]
    async fn idle_expiry_closes_listener() {
        let server = make_server(Some(50));
        let handle = server.listen().await.unwrap();
        let addr = handle.addr;

        let result = tokio::time::timeout(Duration::from_secs(5), handle.task).await;
        assert_matches!(result, Ok(Ok(Ok(()))));
        assert_eq!(server.shutdown().reason(), Some(ShutdownReason::IdleTimeout));
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut server = make_server(None);
        server.config.port = port;
        assert_matches!(server.listen().await, Err(RelayError::Bind { .. }));
    }
}
