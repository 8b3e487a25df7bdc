//! Scripted in-process backend and a fully wired canvas for integration
//! tests.  No network access.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dc_backend::{
    CleanCodeRequest, CleanCodeResponse, CreditsResponse, EditRequest, EditResponse,
    ExecuteRequest, ExecuteResponse, ExecutionBackend, FixRequest, FixResponse,
    MessageContextRequest, SessionContextResponse,
};
use dc_canvas::{AssistController, ExecutionCoordinator, FixLoopController};
use dc_credits::CreditGate;
use dc_domain::config::{CanvasConfig, CreditsConfig, StoreConfig};
use dc_domain::credit::Tier;
use dc_domain::error::{Error, Result};
use dc_sessions::SessionStore;

/// How the stub answers a call.
#[derive(Clone)]
pub enum Reply<T> {
    Respond(T),
    /// Connection refused.
    Transport,
    /// HTTP 500.
    Server,
}

impl<T: Clone> Reply<T> {
    fn resolve(&self, endpoint: &str) -> Result<T> {
        match self {
            Reply::Respond(v) => Ok(v.clone()),
            Reply::Transport => Err(Error::Http(format!("{endpoint}: connection refused"))),
            Reply::Server => Err(Error::Backend(format!("{endpoint} returned 500"))),
        }
    }
}

pub struct StubBackend {
    pub execute_reply: Mutex<Reply<ExecuteResponse>>,
    pub execute_delay_ms: AtomicU64,
    pub executed: Mutex<Vec<ExecuteRequest>>,

    pub fix_reply: Mutex<Reply<FixResponse>>,
    pub fix_delay_ms: AtomicU64,
    pub fix_calls: AtomicUsize,

    pub edit_reply: Mutex<Reply<EditResponse>>,
    pub edit_calls: AtomicUsize,
    pub clean_reply: Mutex<Reply<CleanCodeResponse>>,

    pub context_reply: Mutex<Reply<()>>,
    pub contexts: Mutex<Vec<MessageContextRequest>>,
    pub server_message_id: Mutex<Option<String>>,

    pub credits: Mutex<CreditsResponse>,
    pub deduct_calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            execute_reply: Mutex::new(Reply::Respond(ExecuteResponse {
                output: Some("ok\n".into()),
                ..ExecuteResponse::default()
            })),
            execute_delay_ms: AtomicU64::new(0),
            executed: Mutex::new(Vec::new()),
            fix_reply: Mutex::new(Reply::Respond(FixResponse {
                fixed_code: Some("print('fixed')".into()),
                ..FixResponse::default()
            })),
            fix_delay_ms: AtomicU64::new(0),
            fix_calls: AtomicUsize::new(0),
            edit_reply: Mutex::new(Reply::Respond(EditResponse {
                edited_code: Some("print('edited')".into()),
                ..EditResponse::default()
            })),
            edit_calls: AtomicUsize::new(0),
            clean_reply: Mutex::new(Reply::Respond(CleanCodeResponse {
                cleaned_code: "print('clean')".into(),
                session_id: None,
            })),
            context_reply: Mutex::new(Reply::Respond(())),
            contexts: Mutex::new(Vec::new()),
            server_message_id: Mutex::new(None),
            credits: Mutex::new(CreditsResponse {
                total: 10,
                used: 0,
                tier: Tier::Free,
                reset_date: None,
            }),
            deduct_calls: AtomicUsize::new(0),
        }
    }

    pub fn reply_output(&self, text: &str) {
        *self.execute_reply.lock() = Reply::Respond(ExecuteResponse {
            output: Some(text.into()),
            ..ExecuteResponse::default()
        });
    }

    pub fn reply_error(&self, text: &str) {
        *self.execute_reply.lock() = Reply::Respond(ExecuteResponse {
            error: Some(text.into()),
            ..ExecuteResponse::default()
        });
    }

    pub fn execute_count(&self) -> usize {
        self.executed.lock().len()
    }

    pub fn context_ids(&self) -> Vec<String> {
        self.contexts
            .lock()
            .iter()
            .map(|c| c.message_id.clone())
            .collect()
    }
}

#[async_trait]
impl ExecutionBackend for StubBackend {
    async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse> {
        self.executed.lock().push(req);
        let delay = self.execute_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let reply = self.execute_reply.lock().clone();
        reply.resolve("execute")
    }

    async fn fix(&self, _req: FixRequest) -> Result<FixResponse> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.fix_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let reply = self.fix_reply.lock().clone();
        reply.resolve("fix")
    }

    async fn edit(&self, _req: EditRequest) -> Result<EditResponse> {
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.edit_reply.lock().clone();
        reply.resolve("edit")
    }

    async fn clean_code(&self, _req: CleanCodeRequest) -> Result<CleanCodeResponse> {
        let reply = self.clean_reply.lock().clone();
        reply.resolve("clean-code")
    }

    async fn set_message_context(&self, req: MessageContextRequest) -> Result<()> {
        self.contexts.lock().push(req);
        let reply = self.context_reply.lock().clone();
        reply.resolve("message-context")
    }

    async fn get_session_context(&self, _session_id: &str) -> Result<SessionContextResponse> {
        Ok(SessionContextResponse {
            current_message_id: self.server_message_id.lock().clone(),
        })
    }

    async fn get_credits(&self, _user_id: &str) -> Result<CreditsResponse> {
        Ok(self.credits.lock().clone())
    }

    async fn deduct_credits(&self, _user_id: &str, amount: u64) -> Result<()> {
        self.deduct_calls.fetch_add(1, Ordering::SeqCst);
        self.credits.lock().used += amount;
        Ok(())
    }
}

pub struct Harness {
    pub backend: Arc<StubBackend>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub credits: Arc<CreditGate>,
    pub fix: FixLoopController,
    pub assist: AssistController,
}

pub struct HarnessBuilder {
    canvas: CanvasConfig,
    credits: CreditsConfig,
    ledger: CreditsResponse,
}

impl HarnessBuilder {
    pub fn canvas(mut self, f: impl FnOnce(&mut CanvasConfig)) -> Self {
        f(&mut self.canvas);
        self
    }

    pub fn credits(mut self, f: impl FnOnce(&mut CreditsConfig)) -> Self {
        f(&mut self.credits);
        self
    }

    pub fn ledger(mut self, total: u64, used: u64, tier: Tier) -> Self {
        self.ledger = CreditsResponse {
            total,
            used,
            tier,
            reset_date: None,
        };
        self
    }

    pub async fn build(self) -> Harness {
        let backend = Arc::new(StubBackend::new());
        *backend.credits.lock() = self.ledger;
        let store = Arc::new(SessionStore::in_memory(StoreConfig::default()));

        let coordinator = Arc::new(ExecutionCoordinator::new(
            self.canvas,
            backend.clone(),
            store.clone(),
            "s1",
        ));
        let credits = Arc::new(CreditGate::new("u1", self.credits, backend.clone(), store));
        credits.refresh().await.expect("stub credits never fail");

        Harness {
            fix: FixLoopController::new(coordinator.clone(), credits.clone()),
            assist: AssistController::new(coordinator.clone(), credits.clone()),
            backend,
            coordinator,
            credits,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        canvas: CanvasConfig::default(),
        credits: CreditsConfig::default(),
        ledger: CreditsResponse {
            total: 10,
            used: 0,
            tier: Tier::Free,
            reset_date: None,
        },
    }
}
