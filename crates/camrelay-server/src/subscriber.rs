//! Applies pub/sub notifications to the last-frame cell.

use std::sync::Arc;

use camrelay_core::constants::PREVIEW_EVENT;
use camrelay_core::{LastFrame, PreviewEvent};
use camrelay_pubsub::{Subscription, TransportEvent};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumes a subscription and records every `preview` frame.
///
/// Events never touch the idle countdown; only queries keep the relay alive.
#[derive(Clone, Debug)]
pub struct EventSubscriber {
    frames: Arc<LastFrame>,
}

impl EventSubscriber {
    /// Create a subscriber writing into `frames`.
    pub fn new(frames: Arc<LastFrame>) -> Self {
        Self { frames }
    }

    /// Apply one transport event. Returns the recorded URL for previews.
    pub fn handle(&self, event: &TransportEvent) -> Option<String> {
        match event {
            TransportEvent::Connected => {
                info!(origin = %self.frames.origin(), "subscribed to frame notifications");
                None
            }
            TransportEvent::Disconnected { reason } => {
                warn!(reason = %reason, "frame notifications disconnected");
                None
            }
            TransportEvent::Event { name, payload } if name == PREVIEW_EVENT => {
                let event = PreviewEvent::from_payload(payload);
                let url = self.frames.record(event.path());
                debug!(%url, "frame updated");
                Some(url)
            }
            TransportEvent::Event { name, .. } => {
                debug!(event = %name, "ignoring event");
                None
            }
        }
    }

    /// Drain `subscription` until it ends or `stop` fires, then close it.
    #[tracing::instrument(skip_all, name = "event_subscriber")]
    pub async fn run(self, mut subscription: Subscription, stop: CancellationToken) {
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                event = subscription.next() => {
                    let Some(event) = event else {
                        info!("frame notification stream ended");
                        break;
                    };
                    let _ = self.handle(&event);
                }
            }
        }

        if subscription.closer().close().await {
            debug!("subscription closed");
        }
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn spawn(self, subscription: Subscription, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(subscription, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camrelay_core::Origin;
    use serde_json::json;

    fn subscriber() -> (EventSubscriber, Arc<LastFrame>) {
        let frames = Arc::new(LastFrame::new(Origin::new("http://cam:8000")));
        (EventSubscriber::new(Arc::clone(&frames)), frames)
    }

    fn preview(payload: serde_json::Value) -> TransportEvent {
        TransportEvent::Event {
            name: "preview".into(),
            payload,
        }
    }

    #[test]
    fn preview_records_resolved_url() {
        let (sub, frames) = subscriber();
        let url = sub.handle(&preview(json!({"src": "/img/1.jpg"})));
        assert_eq!(url.as_deref(), Some("http://cam:8000/img/1.jpg"));
        assert_eq!(frames.latest().as_deref(), Some("http://cam:8000/img/1.jpg"));
    }

    #[test]
    fn last_preview_wins() {
        let (sub, frames) = subscriber();
        let _ = sub.handle(&preview(json!({"src": "/a.jpg"})));
        let _ = sub.handle(&preview(json!({"src": "/b.jpg"})));
        assert_eq!(frames.latest().as_deref(), Some("http://cam:8000/b.jpg"));
    }

    #[test]
    fn malformed_src_is_concatenated_as_text() {
        let (sub, frames) = subscriber();
        let _ = sub.handle(&preview(json!({})));
        assert_eq!(frames.latest().as_deref(), Some("http://cam:8000undefined"));
        let _ = sub.handle(&preview(json!({"src": null})));
        assert_eq!(frames.latest().as_deref(), Some("http://cam:8000null"));
        let _ = sub.handle(&preview(json!({"src": {"path": "/a.jpg"}})));
        assert_eq!(frames.latest().as_deref(), Some("http://cam:8000[object Object]"));
    }

    #[test]
    fn other_events_are_ignored() {
        let (sub, frames) = subscriber();
        assert_eq!(sub.handle(&TransportEvent::Connected), None);
        assert_eq!(
            sub.handle(&TransportEvent::Event {
                name: "status".into(),
                payload: json!({"src": "/x.jpg"}),
            }),
            None
        );
        assert_eq!(
            sub.handle(&TransportEvent::Disconnected {
                reason: "transport close".into()
            }),
            None
        );
        assert_eq!(frames.latest(), None);
    }

    #[tokio::test]
    async fn run_drains_stream_and_closes() {
        let (sub, frames) = subscriber();
        let subscription = Subscription::from_stream(futures::stream::iter(vec![
            TransportEvent::Connected,
            preview(json!({"src": "/1.jpg"})),
            preview(json!({"src": "/2.jpg"})),
        ]));
        let closer = subscription.closer();

        sub.run(subscription, CancellationToken::new()).await;
        assert_eq!(frames.latest().as_deref(), Some("http://cam:8000/2.jpg"));
        assert!(closer.is_closed());
    }

    #[test]
    fn run_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let (sub, _frames) = subscriber();
        let subscription = Subscription::from_stream(futures::stream::empty());
        let run = sub.run(subscription, CancellationToken::new());
        assert_send(&run);
    }

    #[tokio::test]
    async fn stop_token_ends_run() {
        let (sub, _frames) = subscriber();
        let subscription = Subscription::from_stream(futures::stream::pending());
        let closer = subscription.closer();
        let stop = CancellationToken::new();

        let handle = sub.spawn(subscription, stop.clone());
        stop.cancel();
        handle.await.unwrap();
        assert!(closer.is_closed());
    }
}
