//! Canvas API: the read model and every imperative canvas operation.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use dc_domain::message::Message;

use super::error::ApiError;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request bodies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SwitchSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct AssignIdRequest {
    /// Key the entries were created under (usually positional, `msg-<i>`).
    pub key: String,
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BufferRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FixRequestBody {
    pub error_text: String,
    /// Code to repair; defaults to what would run right now.
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AiEditRequest {
    pub prompt: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/canvas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_canvas(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.snapshot())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn switch_session(
    State(state): State<AppState>,
    Json(body): Json<SwitchSessionRequest>,
) -> impl IntoResponse {
    let changed = state.coordinator.switch_session(&body.session_id);
    Json(serde_json::json!({
        "changed": changed,
        "session_id": state.coordinator.session_id(),
    }))
}

pub async fn turn_started(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator.turn_started();
    Json(serde_json::json!({ "state": state.coordinator.state() }))
}

pub async fn turn_completed(
    State(state): State<AppState>,
    Json(body): Json<MessagesRequest>,
) -> impl IntoResponse {
    Json(state.coordinator.turn_completed(&body.messages).await)
}

pub async fn extract(
    State(state): State<AppState>,
    Json(body): Json<MessagesRequest>,
) -> impl IntoResponse {
    let entries = state.coordinator.extract(&body.messages);
    Json(serde_json::json!({ "entries": entries }))
}

pub async fn assign_message_id(
    State(state): State<AppState>,
    Json(body): Json<AssignIdRequest>,
) -> impl IntoResponse {
    let moved = state
        .coordinator
        .assign_message_id(&body.key, &body.message_id);
    Json(serde_json::json!({ "moved": moved }))
}

pub async fn clear(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator.clear();
    Json(serde_json::json!({ "ok": true }))
}

pub async fn toggle(State(state): State<AppState>) -> impl IntoResponse {
    let visible = state.coordinator.toggle_canvas();
    Json(serde_json::json!({ "visible": visible }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn run_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outputs = state.coordinator.execute(&id).await?;
    Ok(Json(serde_json::json!({
        "entry_id": id,
        "run_state": state.coordinator.run_state(&id),
        "outputs": outputs,
    })))
}

pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.activate(&id)?;
    Ok(Json(serde_json::json!({ "active_entry_id": id })))
}

pub async fn start_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let buffer = state.coordinator.start_edit(&id)?;
    Ok(Json(serde_json::json!({ "entry_id": id, "buffer": buffer })))
}

pub async fn update_buffer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<BufferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.update_buffer(&id, body.text)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn save_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.coordinator.save_edit(&id).await?;
    Ok(Json(serde_json::json!({ "entry": entry })))
}

pub async fn cancel_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.cancel_edit(&id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fix loop & AI assists
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn fix_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.fix.availability(&id)?))
}

pub async fn request_fix(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FixRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let code = body
        .code
        .or_else(|| state.coordinator.code_to_run(&id))
        .unwrap_or_default();
    let outcome = state.fix.request_fix(&id, &body.error_text, &code).await?;
    Ok(Json(outcome))
}

pub async fn ai_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AiEditRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.assist.request_edit(&id, &body.prompt).await?))
}

pub async fn cleanup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.assist.request_cleanup(&id).await?))
}
