//! Credit balance endpoints.
//!
//! - `GET  /v1/credits`        : cached balance, tier and pending local debits
//! - `POST /v1/credits/refresh`: reconcile against the ledger, then return it

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use super::error::ApiError;
use crate::state::AppState;

pub async fn get_credits(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.credits.status())
}

pub async fn refresh_credits(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.credits.reconcile().await?;
    Ok(Json(state.credits.status()))
}
