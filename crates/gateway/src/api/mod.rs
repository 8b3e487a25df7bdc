pub mod admin;
pub mod canvas;
pub mod credits;
pub mod error;
pub mod events;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Entry ids contain a `:` (`<message key>:<language>`); clients send them
/// percent-encoded or as-is, both decode to the same path parameter.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        // Canvas read model + events
        .route("/v1/canvas", get(canvas::get_canvas))
        .route("/v1/canvas/events", get(events::canvas_events_sse))
        // Turn lifecycle
        .route("/v1/canvas/session", post(canvas::switch_session))
        .route("/v1/canvas/turn/started", post(canvas::turn_started))
        .route("/v1/canvas/turn/completed", post(canvas::turn_completed))
        .route("/v1/canvas/extract", post(canvas::extract))
        .route("/v1/canvas/messages/assign-id", post(canvas::assign_message_id))
        .route("/v1/canvas/clear", post(canvas::clear))
        .route("/v1/canvas/toggle", post(canvas::toggle))
        // Entries
        .route("/v1/canvas/entries/:id/run", post(canvas::run_entry))
        .route("/v1/canvas/entries/:id/activate", post(canvas::activate))
        .route("/v1/canvas/entries/:id/edit/start", post(canvas::start_edit))
        .route("/v1/canvas/entries/:id/edit/buffer", post(canvas::update_buffer))
        .route("/v1/canvas/entries/:id/edit/save", post(canvas::save_edit))
        .route("/v1/canvas/entries/:id/edit/cancel", post(canvas::cancel_edit))
        .route(
            "/v1/canvas/entries/:id/fix",
            get(canvas::fix_availability).post(canvas::request_fix),
        )
        .route("/v1/canvas/entries/:id/ai-edit", post(canvas::ai_edit))
        .route("/v1/canvas/entries/:id/cleanup", post(canvas::cleanup))
        // Credits
        .route("/v1/credits", get(credits::get_credits))
        .route("/v1/credits/refresh", post(credits::refresh_credits))
        // Admin
        .route("/v1/admin/shutdown", post(admin::shutdown))
}
