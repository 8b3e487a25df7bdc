use std::sync::Arc;

use sha2::{Digest, Sha256};

use dc_backend::ExecutionBackend;
use dc_canvas::{AssistController, ExecutionCoordinator, FixLoopController};
use dc_credits::CreditGate;
use dc_domain::config::Config;
use dc_sessions::SessionStore;

/// Session the canvas starts on until the UI switches to a real one.
pub const DEFAULT_SESSION: &str = "default";

/// Shared application state passed to all API handlers.
///
/// - **Core services**: config, session store, execution backend
/// - **Canvas**: coordinator, fix loop, AI assists
/// - **Credits**: the gate every paid feature goes through
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<SessionStore>,
    pub backend: Arc<dyn ExecutionBackend>,

    // ── Canvas ────────────────────────────────────────────────────────
    pub coordinator: Arc<ExecutionCoordinator>,
    pub fix: Arc<FixLoopController>,
    pub assist: Arc<AssistController>,

    // ── Credits ───────────────────────────────────────────────────────
    pub credits: Arc<CreditGate>,

    // ── Admin ─────────────────────────────────────────────────────────
    /// SHA-256 of the admin bearer token.  `None` refuses admin routes.
    pub admin_token_hash: Option<Vec<u8>>,
    /// Notified to stop the server gracefully.
    pub shutdown_tx: Arc<tokio::sync::Notify>,
}

impl AppState {
    /// Wire the canvas components around an already-built backend and
    /// store.  Performs no I/O.
    pub fn new(
        config: Arc<Config>,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<SessionStore>,
        session_id: &str,
    ) -> Self {
        let coordinator = Arc::new(ExecutionCoordinator::new(
            config.canvas.clone(),
            backend.clone(),
            store.clone(),
            session_id,
        ));
        let credits = Arc::new(CreditGate::new(
            config.backend.user_id.clone(),
            config.credits.clone(),
            backend.clone(),
            store.clone(),
        ));

        Self {
            fix: Arc::new(FixLoopController::new(coordinator.clone(), credits.clone())),
            assist: Arc::new(AssistController::new(coordinator.clone(), credits.clone())),
            coordinator,
            credits,
            config,
            store,
            backend,
            admin_token_hash: None,
            shutdown_tx: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Enable `/v1/admin/*` behind `token`.  Empty tokens are ignored.
    pub fn with_admin_token(mut self, token: &str) -> Self {
        if !token.is_empty() {
            self.admin_token_hash = Some(Sha256::digest(token.as_bytes()).to_vec());
        }
        self
    }
}
