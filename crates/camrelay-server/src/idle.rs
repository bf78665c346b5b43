//! Debounced idle countdown.
//!
//! The manager is either [`IdleState::Armed`] with a pending timer or
//! [`IdleState::Expired`]. Every [`arm`](IdleLifecycleManager::arm) replaces
//! the pending timer, so only the most recent arm can fire. Expiry is
//! terminal and triggers process shutdown.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Lifecycle state of the idle countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleState {
    /// A countdown is pending.
    Armed,
    /// The countdown fired (or was cancelled); the relay is stopping.
    Expired,
}

struct Countdown {
    state: IdleState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Stops the relay after a period without queries.
pub struct IdleLifecycleManager {
    timeout: Duration,
    shutdown: Arc<ShutdownCoordinator>,
    countdown: Mutex<Countdown>,
    this: Weak<Self>,
}

impl IdleLifecycleManager {
    /// Create a manager and arm it immediately.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(timeout: Duration, shutdown: Arc<ShutdownCoordinator>) -> Arc<Self> {
        let manager = Arc::new_cyclic(|this| Self {
            timeout,
            shutdown,
            countdown: Mutex::new(Countdown {
                state: IdleState::Armed,
                generation: 0,
                timer: None,
            }),
            this: this.clone(),
        });
        let _ = manager.arm();
        manager
    }

    /// Restart the countdown from now.
    ///
    /// Returns `false` once the manager has expired; an expired manager
    /// never re-arms.
    pub fn arm(&self) -> bool {
        let mut countdown = self.countdown.lock();
        if countdown.state == IdleState::Expired {
            return false;
        }

        countdown.generation += 1;
        let generation = countdown.generation;
        if let Some(previous) = countdown.timer.take() {
            previous.abort();
        }

        let this = self.this.clone();
        let timeout = self.timeout;
        countdown.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(manager) = this.upgrade() {
                manager.expire(generation);
            }
        }));
        debug!(generation, "idle countdown armed");
        true
    }

    /// Stop counting without triggering shutdown. Used during teardown.
    pub fn cancel(&self) {
        let mut countdown = self.countdown.lock();
        countdown.state = IdleState::Expired;
        if let Some(timer) = countdown.timer.take() {
            timer.abort();
        }
    }

    /// Current state.
    pub fn state(&self) -> IdleState {
        self.countdown.lock().state
    }

    /// Configured idle timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn expire(&self, generation: u64) {
        {
            let mut countdown = self.countdown.lock();
            if countdown.state == IdleState::Expired || countdown.generation != generation {
                return;
            }
            countdown.state = IdleState::Expired;
            countdown.timer = None;
        }

        if self.shutdown.is_shutting_down() {
            return;
        }
        info!(timeout_ms = self.timeout.as_millis(), "Stopping after idle timeout");
        let _ = self.shutdown.shutdown(ShutdownReason::IdleTimeout);
    }
}

impl Drop for IdleLifecycleManager {
    fn drop(&mut self) {
        if let Some(timer) = self.countdown.get_mut().timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for IdleLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleLifecycleManager")
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn start() -> (Arc<IdleLifecycleManager>, Arc<ShutdownCoordinator>) {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        (IdleLifecycleManager::start(TIMEOUT, Arc::clone(&shutdown)), shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn armed_on_start() {
        let (idle, shutdown) = start();
        assert_eq!(idle.state(), IdleState::Armed);
        assert_eq!(idle.timeout(), TIMEOUT);
        assert!(!shutdown.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let (idle, shutdown) = start();
        sleep(TIMEOUT + Duration::from_millis(10)).await;
        assert_eq!(idle.state(), IdleState::Expired);
        assert!(shutdown.is_shutting_down());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::IdleTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn arm_restarts_countdown() {
        let (idle, shutdown) = start();
        for _ in 0..4 {
            sleep(Duration::from_secs(3)).await;
            assert!(idle.arm());
        }
        // 12s elapsed, never 5s without an arm.
        assert_eq!(idle.state(), IdleState::Armed);
        assert!(!shutdown.is_shutting_down());

        sleep(Duration::from_secs(4)).await;
        assert!(!shutdown.is_shutting_down());
        sleep(Duration::from_secs(2)).await;
        assert!(shutdown.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_never_rearms() {
        let (idle, shutdown) = start();
        sleep(TIMEOUT * 2).await;
        assert!(shutdown.is_shutting_down());
        assert!(!idle.arm());
        assert_eq!(idle.state(), IdleState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_without_shutdown() {
        let (idle, shutdown) = start();
        idle.cancel();
        sleep(TIMEOUT * 2).await;
        assert_eq!(idle.state(), IdleState::Expired);
        assert!(!shutdown.is_shutting_down());
        assert!(!idle.arm());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_after_signal_keeps_signal_reason() {
        let (idle, shutdown) = start();
        let _ = shutdown.shutdown(ShutdownReason::Signal);
        sleep(TIMEOUT * 2).await;
        assert_eq!(idle.state(), IdleState::Expired);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_manager_never_fires() {
        let (idle, shutdown) = start();
        drop(idle);
        sleep(TIMEOUT * 2).await;
        assert!(!shutdown.is_shutting_down());
    }
}
