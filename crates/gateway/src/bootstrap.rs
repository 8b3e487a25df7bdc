//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! `serve`, `run` and `credits` share [`build_app_state`] so they boot the
//! same wiring with or without an HTTP listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use dc_domain::config::{Config, ConfigSeverity};
use dc_sessions::SessionStore;

use crate::state::AppState;

/// Validate config, open the session store, connect the backend and return
/// a fully-wired [`AppState`] on `session_id`.
///
/// The credit balance is loaded eagerly; failure to reach the ledger is
/// logged and left to the reconciler.
pub async fn build_app_state(config: Arc<Config>, session_id: &str) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── Session store ────────────────────────────────────────────────
    let store = Arc::new(
        SessionStore::new(config.store.clone()).context("initializing session store")?,
    );
    tracing::info!(
        path = ?config.store.path,
        entries = store.len(),
        "session store ready"
    );

    // ── Execution backend ────────────────────────────────────────────
    let backend =
        dc_backend::create_backend(&config.backend).context("initializing execution backend")?;

    // ── Admin token (read once, kept hashed) ─────────────────────────
    let admin_env = config.server.admin_token_env.clone();
    let admin_token = std::env::var(&admin_env).unwrap_or_default();
    if admin_token.is_empty() {
        tracing::info!(env = %admin_env, "no admin token set, admin routes disabled");
    }

    let state = AppState::new(config, backend, store, session_id).with_admin_token(&admin_token);

    // ── Credits ──────────────────────────────────────────────────────
    match state.credits.refresh().await {
        Ok(ledger) => tracing::info!(
            user_id = %state.credits.user_id(),
            remaining = ledger.remaining(),
            tier = ?ledger.tier,
            "credits loaded"
        ),
        Err(e) => tracing::warn!(
            user_id = %state.credits.user_id(),
            error = %e,
            "credits unavailable at startup; paid features stay locked until the next reconcile"
        ),
    }

    Ok(state)
}

/// Spawn the long-running background tasks (credit reconciliation, store
/// flush, expiry sweep).
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
/// CLI one-shot commands skip it.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Credit reconciliation ────────────────────────────────────────
    dc_credits::spawn_reconciler(
        state.credits.clone(),
        Duration::from_secs(state.config.credits.reconcile_interval_secs),
    );

    // ── Periodic store flush ─────────────────────────────────────────
    if state.config.store.path.is_some() {
        let store = state.store.clone();
        let period = Duration::from_secs(state.config.store.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "session store flush failed"),
                    Err(e) => tracing::warn!(error = %e, "session store flush task panicked"),
                }
            }
        });
    }

    // ── Expiry sweep + run lock pruning ──────────────────────────────
    {
        let store = state.store.clone();
        let coordinator = state.coordinator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let removed = store.prune_expired();
                if removed > 0 {
                    tracing::debug!(removed, "expired store entries pruned");
                }
                coordinator.run_locks().prune_idle();
            }
        });
    }

    tracing::info!("background tasks spawned");
}
