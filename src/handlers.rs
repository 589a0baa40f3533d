use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::emitter::{self, Pacing};
use crate::payload::Payload;
use crate::shutdown::ShutdownCoordinator;

pub const SERVICE_TITLE: &str = "Streaming LLM API";
pub const SERVICE_VERSION: &str = "1.0";

/// Shared application state
pub struct AppState {
    pub payload: Arc<Payload>,
    pub chunk_size: NonZeroUsize,
    pub pacing: Pacing,
    pub shutdown: ShutdownCoordinator,
}

/// Body of `POST /generate`. Both fields are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

/// POST /generate
///
/// Streams the configured payload as delta events, then `[DONE]`.
/// The stream stops as soon as the client goes away or shutdown begins.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let mut guard = state.shutdown.register_stream();
    tracing::debug!(
        stream_id = guard.id(),
        prompt_len = request.prompt.len(),
        stream = request.stream,
        "Starting stream"
    );

    let events = emitter::emit(
        state.payload.clone(),
        state.chunk_size,
        state.pacing,
        state.shutdown.subscribe(),
    );

    // The guard lives inside the body stream, so it drops with the connection.
    let body = events.map(move |event| {
        guard.record(&event);
        Ok::<Bytes, Infallible>(event.to_sse())
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// GET /
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "title": SERVICE_TITLE,
        "version": SERVICE_VERSION
    }))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
