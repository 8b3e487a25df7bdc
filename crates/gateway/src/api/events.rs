//! Server-sent stream of canvas events.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio::sync::broadcast::error::RecvError;

use dc_canvas::CanvasEvent;

use crate::state::AppState;

/// SSE event name for a canvas event.
pub fn event_name(event: &CanvasEvent) -> &'static str {
    match event {
        CanvasEvent::StateChanged { .. } => "canvas.state",
        CanvasEvent::EntriesReplaced { .. } => "canvas.entries",
        CanvasEvent::EntryUpdated { .. } => "canvas.entry",
        CanvasEvent::RunStateChanged { .. } => "canvas.run_state",
        CanvasEvent::OutputsReplaced { .. } => "canvas.outputs",
        CanvasEvent::ActiveChanged { .. } => "canvas.active",
        CanvasEvent::VisibilityChanged { .. } => "canvas.visibility",
        CanvasEvent::FixAttempted { .. } => "canvas.fix",
        CanvasEvent::Notice { .. } => "canvas.notice",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/canvas/events (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A subscriber that falls behind gets a `canvas.lagged` event carrying the
/// number of events it missed and should re-read `GET /v1/canvas`.
pub async fn canvas_events_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let mut rx = state.coordinator.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event(event_name(&event)).data(json));
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "canvas event subscriber lagged");
                    yield Ok(Event::default()
                        .event("canvas.lagged")
                        .data(serde_json::json!({ "missed": missed }).to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
