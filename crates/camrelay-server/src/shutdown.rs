//! Process-wide shutdown coordination via `CancellationToken`.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long teardown waits for a task before giving up on it.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the relay is stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Nobody queried the relay within the idle timeout.
    IdleTimeout,
    /// Interrupted by the operator.
    Signal,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::Signal => f.write_str("signal"),
        }
    }
}

/// Coordinates shutdown across the listener and subscriber tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown. Returns `true` only for the call that started it.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        {
            let mut current = self.reason.lock();
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
        }
        info!(%reason, "shutdown requested");
        self.token.cancel();
        true
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason recorded by the first [`shutdown`](Self::shutdown) call.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait up to `timeout` for `handle`, aborting it if it overruns.
pub async fn drain<T>(name: &str, handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "task ended abnormally");
            None
        }
        Err(_) => {
            warn!(task = name, "task did not stop after {timeout:?}, aborting");
            abort.abort();
            None
        }
    }
}
