//! HTTP surface: routing, JSON shapes and error mapping, against an
//! in-process backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use tower::ServiceExt;

use dc_backend::{
    CleanCodeRequest, CleanCodeResponse, CreditsResponse, EditRequest, EditResponse,
    ExecuteRequest, ExecuteResponse, ExecutionBackend, FixRequest, FixResponse,
    MessageContextRequest, SessionContextResponse,
};
use dc_domain::config::{Config, StoreConfig};
use dc_domain::credit::Tier;
use dc_domain::error::Result;
use dc_gateway::state::AppState;
use dc_sessions::SessionStore;

struct Backend {
    executed: AtomicUsize,
    error: Mutex<Option<String>>,
}

#[async_trait]
impl ExecutionBackend for Backend {
    async fn execute(&self, _req: ExecuteRequest) -> Result<ExecuteResponse> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(match self.error.lock().clone() {
            Some(error) => ExecuteResponse {
                error: Some(error),
                ..ExecuteResponse::default()
            },
            None => ExecuteResponse {
                output: Some("42\n".into()),
                ..ExecuteResponse::default()
            },
        })
    }

    async fn fix(&self, _req: FixRequest) -> Result<FixResponse> {
        Ok(FixResponse {
            fixed_code: Some("print(42)".into()),
            ..FixResponse::default()
        })
    }

    async fn edit(&self, _req: EditRequest) -> Result<EditResponse> {
        Ok(EditResponse {
            edited_code: Some("print(43)".into()),
            ..EditResponse::default()
        })
    }

    async fn clean_code(&self, req: CleanCodeRequest) -> Result<CleanCodeResponse> {
        Ok(CleanCodeResponse {
            cleaned_code: req.code,
            session_id: None,
        })
    }

    async fn set_message_context(&self, _req: MessageContextRequest) -> Result<()> {
        Ok(())
    }

    async fn get_session_context(&self, _session_id: &str) -> Result<SessionContextResponse> {
        Ok(SessionContextResponse::default())
    }

    async fn get_credits(&self, _user_id: &str) -> Result<CreditsResponse> {
        Ok(CreditsResponse {
            total: 10,
            used: 4,
            tier: Tier::Free,
            reset_date: None,
        })
    }

    async fn deduct_credits(&self, _user_id: &str, _amount: u64) -> Result<()> {
        Ok(())
    }
}

async fn app() -> (Router, AppState, Arc<Backend>) {
    let backend = Arc::new(Backend {
        executed: AtomicUsize::new(0),
        error: Mutex::new(None),
    });
    let store = Arc::new(SessionStore::in_memory(StoreConfig::default()));
    let state = AppState::new(Arc::new(Config::default()), backend.clone(), store, "s1");
    state.credits.refresh().await.unwrap();
    let router = dc_gateway::api::router().with_state(state.clone());
    (router, state, backend)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn complete_turn(app: &Router) -> serde_json::Value {
    call(app, "POST", "/v1/canvas/turn/started", None).await;
    let (status, body) = call(
        app,
        "POST",
        "/v1/canvas/turn/completed",
        Some(serde_json::json!({
            "messages": [
                { "id": "u1", "sender": "user", "text": "what is 6 * 7?" },
                { "id": "m1", "sender": "assistant", "text": "```python\nprint(6 * 7)\n```" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_reports_session() {
    let (app, _, _) = app().await;
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_id"], "s1");
}

#[tokio::test]
async fn completed_turn_extracts_and_auto_runs() {
    let (app, _, backend) = app().await;
    let outcome = complete_turn(&app).await;
    assert_eq!(outcome["message_key"], "m1");
    assert_eq!(outcome["executed"][0], "m1:python");
    assert_eq!(backend.executed.load(Ordering::SeqCst), 1);

    let (_, snapshot) = call(&app, "GET", "/v1/canvas", None).await;
    assert_eq!(snapshot["entries"][0]["id"], "m1:python");
    assert_eq!(snapshot["run_states"]["m1:python"], "succeeded");
    assert_eq!(snapshot["outputs"]["m1"][0]["type"], "output");
    assert_eq!(snapshot["outputs"]["m1"][0]["content"], "42\n");
    assert_eq!(snapshot["state"], "settled");
}

#[tokio::test]
async fn run_accepts_percent_encoded_entry_ids() {
    let (app, _, backend) = app().await;
    complete_turn(&app).await;

    let (status, body) = call(&app, "POST", "/v1/canvas/entries/m1%3Apython/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_state"], "succeeded");
    assert_eq!(backend.executed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_entry_is_404_with_code() {
    let (app, _, _) = app().await;
    let (status, body) = call(&app, "POST", "/v1/canvas/entries/nope:python/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unknown_entry");
}

#[tokio::test]
async fn buffer_update_outside_edit_mode_conflicts() {
    let (app, _, _) = app().await;
    complete_turn(&app).await;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/canvas/entries/m1:python/edit/buffer",
        Some(serde_json::json!({ "text": "print(1)" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_editing");
}

#[tokio::test]
async fn edit_round_trip_commits_buffer() {
    let (app, state, _) = app().await;
    complete_turn(&app).await;

    let (_, started) = call(&app, "POST", "/v1/canvas/entries/m1:python/edit/start", None).await;
    assert_eq!(started["buffer"], "print(6 * 7)");
    call(
        &app,
        "POST",
        "/v1/canvas/entries/m1:python/edit/buffer",
        Some(serde_json::json!({ "text": "print(7 * 6)" })),
    )
    .await;
    let (status, saved) = call(&app, "POST", "/v1/canvas/entries/m1:python/edit/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["entry"]["code"], "print(7 * 6)");
    assert_eq!(state.coordinator.entry("m1:python").unwrap().code, "print(7 * 6)");
}

#[tokio::test]
async fn failed_run_offers_a_free_fix() {
    let (app, _, backend) = app().await;
    *backend.error.lock() = Some("NameError: name 'x' is not defined".into());
    complete_turn(&app).await;

    let (_, availability) = call(&app, "GET", "/v1/canvas/entries/m1:python/fix", None).await;
    assert_eq!(availability["can_offer"], true);
    assert_eq!(availability["free_remaining"], 3);
    assert!(availability["pending"].is_null());

    let (status, outcome) = call(
        &app,
        "POST",
        "/v1/canvas/entries/m1:python/fix",
        Some(serde_json::json!({ "error_text": "NameError: name 'x' is not defined" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["attempt"], 1);
    assert_eq!(outcome["paid"], false);
    assert_eq!(outcome["entry"]["code"], "print(42)");
}

#[tokio::test]
async fn empty_fix_error_text_is_unprocessable() {
    let (app, _, _) = app().await;
    complete_turn(&app).await;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/canvas/entries/m1:python/fix",
        Some(serde_json::json!({ "error_text": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "empty_error_text");
}

#[tokio::test]
async fn ai_edit_on_free_tier_requires_upgrade() {
    let (app, _, _) = app().await;
    complete_turn(&app).await;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/canvas/entries/m1:python/ai-edit",
        Some(serde_json::json!({ "prompt": "plot it" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "requires_upgrade");
}

#[tokio::test]
async fn session_switch_clears_canvas() {
    let (app, _, _) = app().await;
    complete_turn(&app).await;

    let (_, body) = call(
        &app,
        "POST",
        "/v1/canvas/session",
        Some(serde_json::json!({ "session_id": "s2" })),
    )
    .await;
    assert_eq!(body["changed"], true);

    let (_, snapshot) = call(&app, "GET", "/v1/canvas", None).await;
    assert_eq!(snapshot["session_id"], "s2");
    assert_eq!(snapshot["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn toggle_flips_visibility() {
    let (app, _, _) = app().await;
    let (_, first) = call(&app, "POST", "/v1/canvas/toggle", None).await;
    let (_, second) = call(&app, "POST", "/v1/canvas/toggle", None).await;
    assert_eq!(first["visible"], true);
    assert_eq!(second["visible"], false);
}

#[tokio::test]
async fn credits_report_remaining_balance() {
    let (app, _, _) = app().await;
    let (status, body) = call(&app, "GET", "/v1/credits", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], 6);
    assert_eq!(body["tier"], "free");

    let (status, body) = call(&app, "POST", "/v1/credits/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], true);
}

async fn shutdown_with(app: &Router, token: Option<&str>) -> StatusCode {
    let mut builder = Request::builder().method("POST").uri("/v1/admin/shutdown");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let resp = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    resp.status()
}

#[tokio::test]
async fn admin_shutdown_is_refused_without_a_configured_token() {
    let (app, _, _) = app().await;
    assert_eq!(shutdown_with(&app, Some("anything")).await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_shutdown_requires_the_token_and_signals_the_server() {
    let (_, state, _) = app().await;
    let state = state.with_admin_token("s3cret");
    let app = dc_gateway::api::router().with_state(state.clone());

    assert_eq!(shutdown_with(&app, None).await, StatusCode::UNAUTHORIZED);
    assert_eq!(shutdown_with(&app, Some("wrong")).await, StatusCode::UNAUTHORIZED);
    assert_eq!(shutdown_with(&app, Some("s3cret")).await, StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(1), state.shutdown_tx.notified())
        .await
        .expect("shutdown was not signalled");
}
