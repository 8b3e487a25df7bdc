//! `dc-backend`: execution backend client crate for DataChat.
//!
//! Provides the [`ExecutionBackend`] trait that abstracts over the remote
//! execution, fix, edit, clean-code, message-context and credit endpoints,
//! a production REST implementation ([`RestBackendClient`]), and typed DTOs
//! matching the backend's camelCase JSON.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use dc_domain::config::BackendConfig;
//! use dc_backend::{ExecuteRequest, ExecutionBackend, RestBackendClient};
//!
//! # async fn example() -> dc_domain::error::Result<()> {
//! let cfg = BackendConfig::default();
//! let client = RestBackendClient::new(&cfg)?;
//!
//! let resp = client
//!     .execute(ExecuteRequest {
//!         code: "print(1 + 1)".into(),
//!         session_id: "s1".into(),
//!         message_id: None,
//!     })
//!     .await?;
//!
//! println!("{:?}", resp.output);
//! # Ok(())
//! # }
//! ```

pub mod provider;
pub mod rest;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use provider::ExecutionBackend;
pub use rest::{from_reqwest, RestBackendClient};
pub use types::{
    CleanCodeRequest, CleanCodeResponse, CreditsResponse, DeductCreditsRequest, EditRequest,
    EditResponse, ExecuteRequest, ExecuteResponse, FixRequest, FixResponse, MessageContextRequest,
    SessionContextResponse,
};

use std::sync::Arc;

use dc_domain::config::BackendConfig;
use dc_domain::error::Result;

/// Create the shared [`ExecutionBackend`] for the process.
pub fn create_backend(cfg: &BackendConfig) -> Result<Arc<dyn ExecutionBackend>> {
    let client = RestBackendClient::new(cfg)?;
    tracing::info!(
        base_url = %cfg.base_url,
        timeout_ms = cfg.timeout_ms,
        max_retries = cfg.max_retries,
        "execution backend client ready"
    );
    Ok(Arc::new(client))
}
