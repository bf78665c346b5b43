//! Subscription handle and the transport seam.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

/// How long `close` waits for the connection task to say goodbye.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Something that happened on a subscribed namespace.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The namespace join was confirmed.
    Connected,
    /// The connection was lost or closed.
    Disconnected {
        /// Why the connection ended.
        reason: String,
    },
    /// A named event arrived; `payload` is its first argument.
    Event {
        /// Event name.
        name: String,
        /// First event argument, `null` when absent.
        payload: Value,
    },
}

/// Boxed stream of transport events.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// The publish/subscribe capability the relay depends on.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Subscribe to a namespace. Events arrive lazily on the returned handle.
    async fn subscribe(&self, namespace: &str) -> Result<Subscription>;
}

/// Cloneable close handle for a [`Subscription`].
///
/// Closing is idempotent: only the first call cancels the connection task.
#[derive(Clone, Debug)]
pub struct SubscriptionCloser {
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SubscriptionCloser {
    /// Closer for a connection task driven by `cancel`.
    pub fn new(cancel: CancellationToken, task: Option<JoinHandle<()>>) -> Self {
        Self {
            cancel,
            closed: Arc::new(AtomicBool::new(false)),
            task: Arc::new(Mutex::new(task)),
        }
    }

    /// Close the connection. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                tracing::warn!("subscription task did not stop in time, aborting");
                abort.abort();
            }
        }
        true
    }

    /// Whether the subscription has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A live subscription: a lazy stream of events plus its close handle.
pub struct Subscription {
    events: EventStream,
    closer: SubscriptionCloser,
}

impl Subscription {
    /// Assemble a subscription from its parts.
    pub fn new(events: EventStream, closer: SubscriptionCloser) -> Self {
        Self { events, closer }
    }

    /// Subscription over an in-memory stream, with no connection behind it.
    pub fn from_stream(events: impl Stream<Item = TransportEvent> + Send + 'static) -> Self {
        Self::new(
            Box::pin(events),
            SubscriptionCloser::new(CancellationToken::new(), None),
        )
    }

    /// A clone of the close handle.
    pub fn closer(&self) -> SubscriptionCloser {
        self.closer.clone()
    }

    /// Close the subscription. See [`SubscriptionCloser::close`].
    ///
    /// The returned future owns a closer clone, so it stays `Send` even
    /// though the event stream itself is not `Sync`.
    pub fn close(&self) -> impl Future<Output = bool> + Send + 'static {
        let closer = self.closer.clone();
        async move { closer.close().await }
    }
}

impl Stream for Subscription {
    type Item = TransportEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.closer.is_closed())
            .finish_non_exhaustive()
    }
}
