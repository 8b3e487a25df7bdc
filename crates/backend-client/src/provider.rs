//! The `ExecutionBackend` trait defines the interface for every backend the
//! canvas talks to (REST, or a test double).

use async_trait::async_trait;
use dc_domain::error::Result;

use crate::types::{
    CleanCodeRequest, CleanCodeResponse, CreditsResponse, EditRequest, EditResponse,
    ExecuteRequest, ExecuteResponse, FixRequest, FixResponse, MessageContextRequest,
    SessionContextResponse,
};

/// Abstraction over the execution backend API surface.
///
/// Implementations return `Err` only for transport failures and error
/// statuses.  A program that ran and raised is a successful call whose
/// response carries `error`.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run code in the session's interpreter (POST /api/execute).
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse>;

    /// Ask the fix service to repair failing code (POST /api/fix).
    async fn fix(&self, req: FixRequest) -> Result<FixResponse>;

    /// Apply a natural-language edit to code (POST /api/edit).
    async fn edit(&self, req: EditRequest) -> Result<EditResponse>;

    /// Tidy code without changing behaviour (POST /api/clean-code).
    async fn clean_code(&self, req: CleanCodeRequest) -> Result<CleanCodeResponse>;

    /// Associate subsequent calls with a message (POST /api/message-context).
    /// Idempotent.
    async fn set_message_context(&self, req: MessageContextRequest) -> Result<()>;

    /// Server-held context for a session (GET /api/sessions/{id}/context).
    async fn get_session_context(&self, session_id: &str) -> Result<SessionContextResponse>;

    /// Current credit ledger (GET /api/credits/{userId}).
    async fn get_credits(&self, user_id: &str) -> Result<CreditsResponse>;

    /// Deduct credits (POST /api/credits/{userId}/deduct).  Not idempotent.
    async fn deduct_credits(&self, user_id: &str, amount: u64) -> Result<()>;
}
