//! Mapping of canvas and backend failures onto HTTP responses.
//!
//! Every error body has the shape `{ "error": "<message>", "code": "<kind>" }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use dc_canvas::CanvasError;

/// Build a standardized JSON error response.
pub fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into(), "code": code })),
    )
        .into_response()
}

/// Handler-level error wrapper so handlers can use `?`.
#[derive(Debug)]
pub enum ApiError {
    Canvas(CanvasError),
    Backend(dc_domain::error::Error),
}

impl From<CanvasError> for ApiError {
    fn from(e: CanvasError) -> Self {
        ApiError::Canvas(e)
    }
}

impl From<dc_domain::error::Error> for ApiError {
    fn from(e: dc_domain::error::Error) -> Self {
        ApiError::Backend(e)
    }
}

pub fn status_for(err: &CanvasError) -> StatusCode {
    match err {
        CanvasError::UnknownEntry(_) => StatusCode::NOT_FOUND,
        CanvasError::EntryBusy(_)
        | CanvasError::NotEditing(_)
        | CanvasError::SessionChanged { .. } => StatusCode::CONFLICT,
        CanvasError::EmptyErrorText
        | CanvasError::EmptyPrompt
        | CanvasError::NotExecutable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CanvasError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        CanvasError::RequiresUpgrade { .. } => StatusCode::FORBIDDEN,
        CanvasError::Service(_) | CanvasError::Network(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Canvas(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    tracing::warn!(code = e.code(), error = %e, "canvas request failed");
                }
                api_error(status, e.code(), e.to_string())
            }
            ApiError::Backend(e) => {
                tracing::warn!(error = %e, "backend request failed");
                let code = if e.is_transport() {
                    "network_error"
                } else {
                    "service_error"
                };
                api_error(StatusCode::BAD_GATEWAY, code, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_domain::credit::Feature;

    #[test]
    fn canvas_errors_map_to_distinct_statuses() {
        assert_eq!(
            status_for(&CanvasError::UnknownEntry("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&CanvasError::EntryBusy("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&CanvasError::InsufficientCredits {
                required: 1,
                remaining: 0
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(&CanvasError::RequiresUpgrade {
                feature: Feature::AiEdit
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&CanvasError::EmptyPrompt),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&CanvasError::Network("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
