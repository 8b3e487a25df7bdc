//! HTTP listener: middleware stack, origin policy and graceful stop.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tokio::sync::Notify;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dc_domain::config::CorsConfig;

use crate::api;
use crate::state::AppState;
use crate::telemetry::Telemetry;

/// Why the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Terminate,
    /// `POST /v1/admin/shutdown`.
    AdminRequest,
}

/// Serve the API until a signal or an admin request, then flush the store
/// and the span exporter.
pub async fn serve(state: AppState, telemetry: Telemetry) -> anyhow::Result<()> {
    let config = state.config.clone();
    let max_concurrent = config.server.max_concurrent_requests.max(1);

    let app = api::router()
        .layer(OriginPolicy::from_config(&config.server.cors).into_layer())
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(
        addr = %addr,
        session_id = %state.coordinator.session_id(),
        backend = %config.backend.base_url,
        max_concurrent,
        otlp = telemetry.exporting(),
        "DataChat listening"
    );

    let stop = state.shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = wait_for_stop(stop).await;
            tracing::info!(?reason, "stopping");
        })
        .await
        .context("axum server error")?;

    if let Err(e) = state.store.flush() {
        tracing::warn!(error = %e, "session store flush on shutdown failed");
    }
    telemetry.shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on SIGINT, SIGTERM (unix) or a notification on `requested`.
pub async fn wait_for_stop(requested: Arc<Notify>) -> StopReason {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = requested.notified() => StopReason::AdminRequest,
        _ = tokio::signal::ctrl_c() => StopReason::Interrupt,
        _ = terminate => StopReason::Terminate,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Origin policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which browser origins may call the API.
///
/// `server.cors.allowed_origins` holds exact origins, `scheme://host:*`
/// patterns matching any numeric port, or a lone `"*"`.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    any: bool,
    exact: Vec<String>,
    /// `scheme://host:` prefixes from `:*` patterns.
    any_port: Vec<String>,
}

impl OriginPolicy {
    pub fn from_config(cors: &CorsConfig) -> Self {
        let mut policy = Self::default();
        for origin in &cors.allowed_origins {
            let origin = origin.trim();
            if origin == "*" {
                policy.any = true;
            } else if let Some(prefix) = origin.strip_suffix('*').filter(|p| p.ends_with(':')) {
                policy.any_port.push(prefix.to_owned());
            } else if HeaderValue::from_str(origin).is_ok() {
                policy.exact.push(origin.to_owned());
            } else {
                tracing::warn!(origin, "invalid CORS origin, skipping");
            }
        }
        if policy.any {
            tracing::warn!("CORS allows every origin");
        }
        policy
    }

    pub fn allows(&self, origin: &str) -> bool {
        if self.any || self.exact.iter().any(|o| o == origin) {
            return true;
        }
        self.any_port.iter().any(|prefix| {
            origin
                .strip_prefix(prefix.as_str())
                .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
        })
    }

    pub fn into_layer(self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
        if self.any {
            return layer.allow_origin(Any);
        }
        layer
            .allow_origin(AllowOrigin::predicate(move |origin, _| {
                origin.to_str().is_ok_and(|o| self.allows(o))
            }))
            .allow_credentials(true)
    }
}
