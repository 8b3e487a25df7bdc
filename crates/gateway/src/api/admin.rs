//! Operator endpoints, all behind [`AdminGuard`].

use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Extractor enforcing the admin bearer token.
///
/// The presented token is hashed and compared to the stored hash in
/// constant time.  With no token configured every request is refused.
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = &state.admin_token_hash else {
            return Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": "admin routes are disabled",
                    "code": "admin_disabled",
                })),
            ));
        };

        let provided = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");
        let provided = Sha256::digest(provided.as_bytes());

        if !bool::from(provided.ct_eq(expected.as_slice())) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "invalid admin token",
                    "code": "unauthorized",
                })),
            ));
        }
        Ok(AdminGuard)
    }
}

/// POST /v1/admin/shutdown: stop accepting requests, flush the store, exit.
pub async fn shutdown(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!(session_id = %state.coordinator.session_id(), "shutdown requested via API");
    state.shutdown_tx.notify_one();
    Json(serde_json::json!({ "shutting_down": true }))
}
