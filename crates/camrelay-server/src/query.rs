//! `GET /`: the current frame URL.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use camrelay_core::LastFrame;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::idle::IdleLifecycleManager;

/// Body of `GET /`. `src` is `null` until the first frame arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameResponse {
    /// Absolute URL of the most recent frame.
    pub src: Option<String>,
}

/// Shared state accessible from the query handler.
#[derive(Clone, Debug)]
pub struct QueryState {
    /// The last-frame cell.
    pub frames: Arc<LastFrame>,
    /// Idle countdown to re-arm on each query, if enabled.
    pub idle: Option<Arc<IdleLifecycleManager>>,
}

/// Build the query router.
pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/", get(frame_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /
async fn frame_handler(State(state): State<QueryState>) -> Json<FrameResponse> {
    let body = FrameResponse {
        src: state.frames.latest(),
    };
    if let Some(idle) = &state.idle {
        let _ = idle.arm();
    }
    Json(body)
}
