//! Data Transfer Objects for the execution backend API.
//!
//! Field names use `camelCase` on the wire and `snake_case` in Rust code via
//! `#[serde(rename_all = "camelCase")]`.  Responses may echo the `sessionId`
//! the request was made for; the canvas uses it to drop late answers that
//! belong to a session the user already left.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dc_domain::credit::{CreditLedger, Tier};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/execute: request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub code: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// POST /api/execute: response body.  Any combination of fields may be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub chart_outputs: Vec<serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AI code transforms
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/fix: request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRequest {
    pub code: String,
    pub error_text: String,
    pub session_id: String,
}

/// POST /api/fix: `{ fixedCode }` on success, `{ error }` when the service
/// could not produce a fix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixResponse {
    #[serde(default)]
    pub fixed_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/edit: request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub original_code: String,
    pub user_prompt: String,
    pub session_id: String,
}

/// POST /api/edit: `{ editedCode }` or `{ error }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    #[serde(default)]
    pub edited_code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/clean-code: request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanCodeRequest {
    pub code: String,
    pub session_id: String,
}

/// POST /api/clean-code: response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanCodeResponse {
    pub cleaned_code: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /api/message-context: request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContextRequest {
    pub message_id: String,
    pub session_id: String,
}

/// GET /api/sessions/{sessionId}/context: response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContextResponse {
    #[serde(default)]
    pub current_message_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /api/credits/{userId}: response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub total: u64,
    pub used: u64,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub reset_date: Option<DateTime<Utc>>,
}

impl From<CreditsResponse> for CreditLedger {
    fn from(r: CreditsResponse) -> Self {
        CreditLedger {
            total: r.total,
            used: r.used,
            tier: r.tier,
            reset_date: r.reset_date,
        }
    }
}

/// POST /api/credits/{userId}/deduct: request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductCreditsRequest {
    pub amount: u64,
}
