//! REST implementation of [`ExecutionBackend`].
//!
//! `RestBackendClient` wraps a `reqwest::Client` and translates every trait
//! method into the corresponding HTTP call.  Idempotent calls (message
//! context, session context, credit reads) are retried with exponential
//! back-off on transient (5xx / timeout / connect) failures.  Calls with side
//! effects (execute, fix, edit, clean-code, deduct) are sent exactly once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use dc_domain::config::BackendConfig;
use dc_domain::error::{Error, Result};
use dc_domain::trace::TraceEvent;

use crate::provider::ExecutionBackend;
use crate::types::{
    CleanCodeRequest, CleanCodeResponse, CreditsResponse, DeductCreditsRequest, EditRequest,
    EditResponse, ExecuteRequest, ExecuteResponse, FixRequest, FixResponse, MessageContextRequest,
    SessionContextResponse,
};

/// Whether a call may be repeated after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Idempotent,
    Once,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST client for the execution backend.
///
/// Created once and reused for the lifetime of the process.  The underlying
/// `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestBackendClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl RestBackendClient {
    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a new client from the shared `BackendConfig`.
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let base_url = cfg.base_url.trim_end_matches('/').to_owned();

        Ok(Self {
            http,
            base_url,
            api_key: cfg.api_key.clone(),
            timeout,
            max_retries: cfg.max_retries,
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    /// Decorate a `RequestBuilder` with the standard DataChat headers.
    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let trace_id = Uuid::new_v4().to_string();
        let mut rb = rb
            .header("X-Client-Type", "datachat")
            .header("X-Trace-Id", &trace_id);

        if let Some(ref key) = self.api_key {
            rb = rb.header("X-Api-Key", key);
        }
        rb
    }

    /// Build the full URL for a path like `/api/execute`.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Send a request, retrying transient failures for idempotent calls.
    ///
    /// * 5xx and transport errors are transient.
    /// * 4xx is permanent and never retried.
    /// * Emits a `TraceEvent::BackendCall` after every attempt.
    async fn send(
        &self,
        endpoint: &str,
        retry: Retry,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let attempts = match retry {
            Retry::Idempotent => self.max_retries,
            Retry::Once => 0,
        };
        let mut last_err: Option<Error> = None;

        for attempt in 0..=attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }

            let start = Instant::now();
            let rb = self.decorate(build_request());
            let result = rb.send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    TraceEvent::BackendCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    if resp.status().is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Backend(format!(
                            "{endpoint} returned {status}: {}",
                            error_message(&body)
                        )));
                        continue;
                    }

                    if resp.status().is_client_error() {
                        let resp_status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        if resp_status == StatusCode::UNAUTHORIZED
                            || resp_status == StatusCode::FORBIDDEN
                        {
                            return Err(Error::Auth(format!(
                                "{endpoint} auth failed ({status}): {}",
                                error_message(&body)
                            )));
                        }
                        return Err(Error::Backend(format!(
                            "{endpoint} returned {status}: {}",
                            error_message(&body)
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let status = e.status().map(|s| s.as_u16()).unwrap_or(0);

                    TraceEvent::BackendCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    last_err = Some(from_reqwest(e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Backend(format!("{endpoint}: all retries exhausted"))))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        retry: Retry,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<T> {
        let resp = self.send(endpoint, retry, build_request).await?;
        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Backend(format!("failed to parse {endpoint} response: {e}: {body}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl ExecutionBackend for RestBackendClient {
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse> {
        let url = self.url("/api/execute");
        self.send_json("POST /api/execute", Retry::Once, || {
            self.http.post(&url).json(&req)
        })
        .await
    }

    async fn fix(&self, req: FixRequest) -> Result<FixResponse> {
        let url = self.url("/api/fix");
        self.send_json("POST /api/fix", Retry::Once, || self.http.post(&url).json(&req))
            .await
    }

    async fn edit(&self, req: EditRequest) -> Result<EditResponse> {
        let url = self.url("/api/edit");
        self.send_json("POST /api/edit", Retry::Once, || self.http.post(&url).json(&req))
            .await
    }

    async fn clean_code(&self, req: CleanCodeRequest) -> Result<CleanCodeResponse> {
        let url = self.url("/api/clean-code");
        self.send_json("POST /api/clean-code", Retry::Once, || {
            self.http.post(&url).json(&req)
        })
        .await
    }

    async fn set_message_context(&self, req: MessageContextRequest) -> Result<()> {
        let url = self.url("/api/message-context");
        self.send("POST /api/message-context", Retry::Idempotent, || {
            self.http.post(&url).json(&req)
        })
        .await?;
        Ok(())
    }

    async fn get_session_context(&self, session_id: &str) -> Result<SessionContextResponse> {
        let url = self.url(&format!("/api/sessions/{session_id}/context"));
        self.send_json("GET /api/sessions/{id}/context", Retry::Idempotent, || {
            self.http.get(&url)
        })
        .await
    }

    async fn get_credits(&self, user_id: &str) -> Result<CreditsResponse> {
        let url = self.url(&format!("/api/credits/{user_id}"));
        self.send_json("GET /api/credits/{user}", Retry::Idempotent, || {
            self.http.get(&url)
        })
        .await
    }

    async fn deduct_credits(&self, user_id: &str, amount: u64) -> Result<()> {
        let url = self.url(&format!("/api/credits/{user_id}/deduct"));
        let req = DeductCreditsRequest { amount };
        self.send("POST /api/credits/{user}/deduct", Retry::Once, || {
            self.http.post(&url).json(&req)
        })
        .await?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a domain `Error`.
///
/// Timeout errors become `Error::Timeout`; everything else becomes
/// `Error::Http`.
/// Ceiling on the wait between two attempts.
const MAX_BACKOFF_MS: u64 = 10_000;

/// Exponential back-off before retry `attempt` (1-based): 100ms, 200ms,
/// 400ms, ... capped at [`MAX_BACKOFF_MS`].
fn backoff(attempt: u32) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(100u64.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Pull `error` out of a `{ "error": "..." }` body, or return the body as-is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_owned())
}
