//! The execution coordinator.
//!
//! Owns the canvas entries, their outputs and run states, and drives the
//! turn lifecycle:
//!
//! ```text
//! Idle ─turn_started→ AwaitingTurnCompletion ─turn_completed→ Extracting
//!      → AutoRunning (when something is runnable) → Settled
//! ```
//!
//! `turn_completed` acts only on the edge after a `turn_started`; repeated
//! completion signals for the same turn are ignored.  All shared state sits
//! behind one `parking_lot::Mutex` that is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use dc_backend::{ExecuteRequest, ExecuteResponse, ExecutionBackend, MessageContextRequest};
use dc_domain::code::{CodeEntry, ExecutionOutput, RunState};
use dc_domain::config::CanvasConfig;
use dc_domain::error::Result as BackendResult;
use dc_domain::message::Message;
use dc_domain::trace::TraceEvent;
use dc_sessions::{ActiveMessageKey, PendingFix, PendingFixKey, SessionStore};

use crate::attempts::FixAttemptCounter;
use crate::error::CanvasError;
use crate::events::{CanvasEvent, EventBus, NoticeLevel};
use crate::extractor::{entry_id, CodeBlockExtractor};
use crate::run_guard::RunLockMap;
use crate::view::CanvasViewModel;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    #[default]
    Idle,
    AwaitingTurnCompletion,
    Extracting,
    AutoRunning,
    Settled,
}

/// What a `turn_completed` call did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnOutcome {
    pub turn: u64,
    /// No turn was pending, so nothing happened.
    pub ignored: bool,
    pub message_key: Option<String>,
    pub extracted: usize,
    /// Entries executed by auto-run.
    pub executed: Vec<String>,
    /// Auto-run was skipped as a replay right after the canvas opened.
    pub suppressed: bool,
}

/// Read model of the whole canvas.
#[derive(Debug, Clone, Serialize)]
pub struct CanvasSnapshot {
    pub session_id: String,
    pub state: CoordinatorState,
    pub turn: u64,
    pub pending_turn: bool,
    pub visible: bool,
    pub active_entry_id: Option<String>,
    pub entries: Vec<CodeEntry>,
    pub editing: Vec<String>,
    /// Message key → live output set.
    pub outputs: BTreeMap<String, Vec<ExecutionOutput>>,
    pub run_states: BTreeMap<String, RunState>,
    pub fix_attempts: BTreeMap<String, u32>,
    /// Entry id → fix request still out with the fix service.
    pub pending_fixes: BTreeMap<String, PendingFix>,
}

struct Inner {
    state: CoordinatorState,
    session_id: String,
    pending: bool,
    turn: u64,
    view: CanvasViewModel,
    outputs: HashMap<String, Vec<ExecutionOutput>>,
    run_states: HashMap<String, RunState>,
    /// What the last auto-run executed.
    last_auto_run: Option<AutoRunMark>,
    /// Old entry id → new entry id, after `assign_message_id`.
    renamed: HashMap<String, String>,
}

/// Message key and extracted code of an auto-run.  A completion that
/// matches it exactly is a duplicate and does not run again.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AutoRunMark {
    key: String,
    code: Vec<String>,
}

impl AutoRunMark {
    fn new(key: &str, entries: &[CodeEntry]) -> Self {
        Self {
            key: key.to_owned(),
            code: entries.iter().map(|e| e.code.clone()).collect(),
        }
    }
}

impl Inner {
    fn resolve(&self, id: &str) -> String {
        self.renamed
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ExecutionCoordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ExecutionCoordinator {
    config: CanvasConfig,
    extractor: CodeBlockExtractor,
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<SessionStore>,
    inner: Mutex<Inner>,
    run_locks: RunLockMap,
    fix_attempts: Arc<FixAttemptCounter>,
    events: EventBus,
}

impl ExecutionCoordinator {
    pub fn new(
        config: CanvasConfig,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<SessionStore>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            extractor: CodeBlockExtractor::new(config.chart_language.clone()),
            config,
            backend,
            store,
            inner: Mutex::new(Inner {
                state: CoordinatorState::Idle,
                session_id: session_id.into(),
                pending: false,
                turn: 0,
                view: CanvasViewModel::new(),
                outputs: HashMap::new(),
                run_states: HashMap::new(),
                last_auto_run: None,
                renamed: HashMap::new(),
            }),
            run_locks: RunLockMap::new(),
            fix_attempts: Arc::new(FixAttemptCounter::new()),
            events: EventBus::default(),
        }
    }

    // ── accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn extractor(&self) -> &CodeBlockExtractor {
        &self.extractor
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn run_locks(&self) -> &RunLockMap {
        &self.run_locks
    }

    pub fn fix_attempts(&self) -> &Arc<FixAttemptCounter> {
        &self.fix_attempts
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CanvasEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> String {
        self.inner.lock().session_id.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.lock().state
    }

    pub fn entry(&self, id: &str) -> Option<CodeEntry> {
        let inner = self.inner.lock();
        inner.view.entry(&inner.resolve(id)).cloned()
    }

    pub fn entries(&self) -> Vec<CodeEntry> {
        self.inner.lock().view.entries().to_vec()
    }

    pub fn code_to_run(&self, id: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner.view.code_to_run(&inner.resolve(id))
    }

    pub fn run_state(&self, id: &str) -> RunState {
        let inner = self.inner.lock();
        inner
            .run_states
            .get(&inner.resolve(id))
            .copied()
            .unwrap_or_default()
    }

    /// The live output set for a message.
    pub fn outputs_for(&self, message_key: &str) -> Vec<ExecutionOutput> {
        self.inner
            .lock()
            .outputs
            .get(message_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Text of the entry's recorded error output, if it has one.
    pub fn last_error(&self, entry_id: &str) -> Option<String> {
        let inner = self.inner.lock();
        let id = inner.resolve(entry_id);
        let entry = inner.view.entry(&id)?;
        inner
            .outputs
            .get(&entry.message_key)?
            .iter()
            .find(|o| o.is_error() && o.code_entry_id == id)
            .map(|o| o.text().unwrap_or_default().to_owned())
    }

    pub fn is_visible(&self) -> bool {
        self.inner.lock().view.is_visible()
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        let inner = self.inner.lock();
        CanvasSnapshot {
            session_id: inner.session_id.clone(),
            state: inner.state,
            turn: inner.turn,
            pending_turn: inner.pending,
            visible: inner.view.is_visible(),
            active_entry_id: inner.view.active_id().map(str::to_owned),
            entries: inner.view.entries().to_vec(),
            editing: inner.view.editing_ids(),
            outputs: inner
                .outputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            run_states: inner
                .run_states
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            fix_attempts: self.fix_attempts.snapshot().into_iter().collect(),
            pending_fixes: self
                .store
                .list_under::<PendingFixKey>(&inner.session_id)
                .into_iter()
                .collect(),
        }
    }

    // ── turn lifecycle ───────────────────────────────────────────────

    /// The assistant started answering.  Extraction waits for completion.
    pub fn turn_started(&self) {
        let mut inner = self.inner.lock();
        inner.pending = true;
        self.set_state(&mut inner, CoordinatorState::AwaitingTurnCompletion);
    }

    /// The assistant finished answering.
    ///
    /// Only the first call after `turn_started` does anything: it extracts
    /// the latest assistant message bearing code, replaces the canvas
    /// entries (keeping earlier outputs), resets the fix budget and, with
    /// auto-run on, executes the runnable entries.
    pub async fn turn_completed(&self, messages: &[Message]) -> TurnOutcome {
        let now = Instant::now();
        let window = Duration::from_millis(self.config.open_suppression_ms);

        let (mut outcome, runnable, session_id) = {
            let mut inner = self.inner.lock();
            if !inner.pending {
                tracing::debug!(turn = inner.turn, "turn completion without pending turn, ignored");
                return TurnOutcome {
                    turn: inner.turn,
                    ignored: true,
                    ..TurnOutcome::default()
                };
            }
            inner.pending = false;
            inner.turn += 1;
            let turn = inner.turn;
            self.set_state(&mut inner, CoordinatorState::Extracting);

            let Some((key, entries)) = self.extractor.extract_latest(messages) else {
                tracing::debug!(turn, "turn completed without code");
                // Entries stay on the canvas but get a fresh fix budget.
                let ids: Vec<String> = inner.view.entries().iter().map(|e| e.id.clone()).collect();
                self.fix_attempts.reset_for(ids.iter().map(String::as_str));
                self.set_state(&mut inner, CoordinatorState::Settled);
                return TurnOutcome {
                    turn,
                    ..TurnOutcome::default()
                };
            };

            let extracted = entries.len();
            let runnable: Vec<String> = entries
                .iter()
                .filter(|e| self.config.is_executable(&e.language))
                .map(|e| e.id.clone())
                .collect();
            let mark = AutoRunMark::new(&key, &entries);

            let last_key = inner.last_auto_run.as_ref().map(|m| m.key.as_str());
            let reopened = inner.view.just_opened(window, now) && last_key == Some(key.as_str());
            let duplicate = inner.last_auto_run.as_ref() == Some(&mark);
            let replay = reopened || duplicate;

            let previous_states = std::mem::take(&mut inner.run_states);
            self.install_entries(&mut inner, &key, entries, true);
            if replay {
                // Same message seen again: its runs still stand.
                for (id, state) in previous_states {
                    if let Some(slot) = inner.run_states.get_mut(&id) {
                        *slot = state;
                    }
                }
                tracing::info!(turn, message_key = %key, reopened, "completion repeats the last auto-run, suppressed");
            }

            let runnable = if self.config.auto_run && !replay {
                runnable
            } else {
                Vec::new()
            };
            if runnable.is_empty() {
                self.set_state(&mut inner, CoordinatorState::Settled);
            } else {
                inner.last_auto_run = Some(mark);
                self.set_state(&mut inner, CoordinatorState::AutoRunning);
            }

            let outcome = TurnOutcome {
                turn,
                ignored: false,
                message_key: Some(key),
                extracted,
                executed: Vec::new(),
                suppressed: replay,
            };
            (outcome, runnable, inner.session_id.clone())
        };

        if runnable.is_empty() {
            return outcome;
        }

        TraceEvent::AutoRunFired {
            session_id: session_id.clone(),
            turn: outcome.turn,
            entries: runnable.len(),
        }
        .emit();

        for id in runnable {
            match self.execute(&id).await {
                Ok(_) => outcome.executed.push(id),
                Err(e) => tracing::warn!(entry_id = %id, error = %e, "auto-run skipped entry"),
            }
        }

        let mut inner = self.inner.lock();
        if inner.state == CoordinatorState::AutoRunning && inner.session_id == session_id {
            self.set_state(&mut inner, CoordinatorState::Settled);
        }
        outcome
    }

    /// Re-extract from `messages` without running anything.  The canvas is
    /// left alone when no message bears code.
    pub fn extract(&self, messages: &[Message]) -> Vec<CodeEntry> {
        let mut inner = self.inner.lock();
        let Some((key, entries)) = self.extractor.extract_latest(messages) else {
            return Vec::new();
        };
        self.install_entries(&mut inner, &key, entries.clone(), false);
        entries
    }

    fn install_entries(&self, inner: &mut Inner, key: &str, entries: Vec<CodeEntry>, new_turn: bool) {
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let languages: Vec<String> = entries.iter().map(|e| e.language.clone()).collect();

        if new_turn {
            self.fix_attempts.reset_for(ids.iter().map(String::as_str));
        } else {
            for id in &ids {
                self.fix_attempts.ensure(id);
            }
        }
        inner.run_states = ids.iter().map(|id| (id.clone(), RunState::NotRun)).collect();
        inner.renamed.clear();
        inner.view.replace_entries(entries);

        TraceEvent::CodeExtracted {
            message_key: key.to_owned(),
            entries: ids.len(),
            languages,
        }
        .emit();
        self.events.publish(CanvasEvent::EntriesReplaced {
            message_key: key.to_owned(),
            entry_ids: ids,
        });
    }

    // ── execution ────────────────────────────────────────────────────

    /// Run an entry: the scratch buffer while editing, the committed code
    /// otherwise.
    ///
    /// Backend failures do not surface as `Err`; they become an error
    /// output.  `Err` means the run never started (unknown, display-only or
    /// busy entry) or its result was dropped because the session changed.
    pub async fn execute(&self, entry_id: &str) -> Result<Vec<ExecutionOutput>, CanvasError> {
        let (entry, code, session_id) = {
            let inner = self.inner.lock();
            let id = inner.resolve(entry_id);
            let entry = inner
                .view
                .entry(&id)
                .cloned()
                .ok_or_else(|| CanvasError::UnknownEntry(entry_id.to_owned()))?;
            if !self.config.is_executable(&entry.language) {
                return Err(CanvasError::NotExecutable {
                    entry_id: entry.id,
                    language: entry.language,
                });
            }
            let code = inner
                .view
                .code_to_run(&id)
                .unwrap_or_else(|| entry.code.clone());
            (entry, code, inner.session_id.clone())
        };

        let _permit = self.run_locks.try_acquire(&entry.id)?;
        self.set_running(&entry.id, true);

        if let Some(message_id) = entry.source_message_id.as_deref() {
            self.notify_message_context(&session_id, message_id).await;
        }

        let start = Instant::now();
        let result = self
            .backend
            .execute(ExecuteRequest {
                code,
                session_id: session_id.clone(),
                message_id: entry.source_message_id.clone(),
            })
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let echoed = result.as_ref().ok().and_then(|r| r.session_id.clone());
        if let Err(e) = self.ensure_current("execute", &session_id, echoed.as_deref()) {
            if self.session_id() == session_id {
                self.set_running(&entry.id, false);
            }
            return Err(e);
        }

        let mut inner = self.inner.lock();
        let id = inner.resolve(&entry.id);
        let Some(current) = inner.view.entry_mut(&id) else {
            tracing::debug!(entry_id = %id, "entry left the canvas while running, result dropped");
            return Err(CanvasError::UnknownEntry(id));
        };
        current.is_executing = false;
        let message_key = current.message_key.clone();

        let outputs = classify(result, &message_key, &id);
        let failed = outputs.iter().any(ExecutionOutput::is_error);
        let state = if failed { RunState::Failed } else { RunState::Succeeded };
        inner.outputs.insert(message_key.clone(), outputs.clone());
        inner.run_states.insert(id.clone(), state);
        drop(inner);

        TraceEvent::ExecutionFinished {
            session_id,
            entry_id: id.clone(),
            message_key: message_key.clone(),
            outputs: outputs.len(),
            failed,
            duration_ms,
        }
        .emit();
        self.events.publish(CanvasEvent::RunStateChanged { entry_id: id, state });
        self.events.publish(CanvasEvent::OutputsReplaced {
            message_key,
            outputs: outputs.clone(),
        });
        Ok(outputs)
    }

    fn set_running(&self, entry_id: &str, running: bool) {
        let state = if running { RunState::Running } else { RunState::NotRun };
        {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.view.entry_mut(entry_id) else {
                return;
            };
            entry.is_executing = running;
            inner.run_states.insert(entry_id.to_owned(), state);
        }
        self.events.publish(CanvasEvent::RunStateChanged {
            entry_id: entry_id.to_owned(),
            state,
        });
    }

    /// Tell the backend which message subsequent calls belong to.  Failure
    /// is logged and otherwise ignored.
    async fn notify_message_context(&self, session_id: &str, message_id: &str) {
        let req = MessageContextRequest {
            message_id: message_id.to_owned(),
            session_id: session_id.to_owned(),
        };
        match self.backend.set_message_context(req).await {
            Ok(()) => {
                let id = message_id.to_owned();
                if let Err(e) = self.store.put::<ActiveMessageKey>(session_id, &id) {
                    tracing::debug!(error = %e, "could not remember active message");
                }
            }
            Err(e) => tracing::warn!(
                session_id,
                message_id,
                error = %e,
                "message context notification failed"
            ),
        }
    }

    /// `Err(SessionChanged)` when a result requested for `requested` must be
    /// dropped: the active session moved on, or the response names another
    /// session.
    pub fn ensure_current(
        &self,
        operation: &str,
        requested: &str,
        echoed: Option<&str>,
    ) -> Result<(), CanvasError> {
        let active = self.session_id();
        let stale_by = if active != requested {
            Some(active)
        } else {
            echoed.filter(|e| *e != requested).map(str::to_owned)
        };
        let Some(active) = stale_by else {
            return Ok(());
        };
        TraceEvent::StaleResponseDropped {
            operation: operation.to_owned(),
            requested_session: requested.to_owned(),
            active_session: active.clone(),
        }
        .emit();
        Err(CanvasError::SessionChanged {
            requested: requested.to_owned(),
            active,
        })
    }

    // ── manual edits ─────────────────────────────────────────────────

    /// Enter edit mode; returns the scratch buffer.
    pub fn start_edit(&self, entry_id: &str) -> Result<String, CanvasError> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(entry_id);
        inner.view.start_edit(&id).map(str::to_owned)
    }

    pub fn update_buffer(&self, entry_id: &str, text: String) -> Result<(), CanvasError> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(entry_id);
        inner.view.update_buffer(&id, text)
    }

    pub fn cancel_edit(&self, entry_id: &str) -> Result<(), CanvasError> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(entry_id);
        inner.view.cancel_edit(&id)
    }

    /// Commit the scratch buffer and tell the backend which message the code
    /// belongs to.  The message id is the entry's own, else the last one the
    /// backend was told about, else whatever the backend holds for the
    /// session.
    pub async fn save_edit(&self, entry_id: &str) -> Result<CodeEntry, CanvasError> {
        let (entry, session_id) = {
            let mut inner = self.inner.lock();
            let id = inner.resolve(entry_id);
            let entry = inner.view.commit_edit(&id)?;
            (entry, inner.session_id.clone())
        };
        self.events.publish(CanvasEvent::EntryUpdated {
            entry: entry.clone(),
        });

        let known = entry
            .source_message_id
            .clone()
            .or_else(|| self.store.get::<ActiveMessageKey>(&session_id));
        let message_id = match known {
            Some(id) => Some(id),
            None => match self.backend.get_session_context(&session_id).await {
                Ok(ctx) => ctx.current_message_id,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "session context lookup failed");
                    None
                }
            },
        };
        match message_id {
            Some(id) => self.notify_message_context(&session_id, &id).await,
            None => tracing::debug!(entry_id = %entry.id, "no message id known for saved edit"),
        }
        Ok(entry)
    }

    /// Replace an entry's code with a service-produced patch.  The entry is
    /// left ready for an explicit re-run.
    pub fn apply_patch(
        &self,
        entry_id: &str,
        code: String,
        clear_error: bool,
    ) -> Result<CodeEntry, CanvasError> {
        let mut inner = self.inner.lock();
        let id = inner.resolve(entry_id);
        let entry = inner.view.set_code(&id, code)?;
        inner.run_states.insert(id.clone(), RunState::NotRun);

        let cleared = if clear_error {
            inner.outputs.get_mut(&entry.message_key).and_then(|outs| {
                let before = outs.len();
                outs.retain(|o| !(o.is_error() && o.code_entry_id == id));
                (outs.len() != before).then(|| outs.clone())
            })
        } else {
            None
        };
        drop(inner);

        self.events.publish(CanvasEvent::EntryUpdated {
            entry: entry.clone(),
        });
        self.events.publish(CanvasEvent::RunStateChanged {
            entry_id: id,
            state: RunState::NotRun,
        });
        if let Some(outputs) = cleared {
            self.events.publish(CanvasEvent::OutputsReplaced {
                message_key: entry.message_key.clone(),
                outputs,
            });
        }
        Ok(entry)
    }

    // ── view ─────────────────────────────────────────────────────────

    pub fn activate(&self, entry_id: &str) -> Result<(), CanvasError> {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.resolve(entry_id);
            inner.view.set_active(&id)?;
            id
        };
        self.events.publish(CanvasEvent::ActiveChanged { entry_id: id });
        Ok(())
    }

    /// Open or close the panel.  Never triggers a run.
    pub fn toggle_canvas(&self) -> bool {
        let visible = self.inner.lock().view.toggle(Instant::now());
        self.events.publish(CanvasEvent::VisibilityChanged { visible });
        visible
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        let changed = self.inner.lock().view.set_visible(visible, Instant::now());
        if changed {
            self.events.publish(CanvasEvent::VisibilityChanged { visible });
        }
        changed
    }

    // ── session ──────────────────────────────────────────────────────

    /// Make `session_id` the active session.  Everything on the canvas
    /// belongs to the old one and is dropped; results still in flight for
    /// it will be discarded when they arrive.
    pub fn switch_session(&self, session_id: &str) -> bool {
        let old = {
            let mut inner = self.inner.lock();
            if inner.session_id == session_id {
                return false;
            }
            let old = std::mem::replace(&mut inner.session_id, session_id.to_owned());
            Self::reset(&mut inner);
            self.fix_attempts.clear();
            self.set_state(&mut inner, CoordinatorState::Idle);
            old
        };
        self.store.remove_under::<PendingFixKey>(&old);
        tracing::info!(from = %old, to = %session_id, "canvas session switched");
        true
    }

    /// Empty the canvas for a chat reset.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        Self::reset(&mut inner);
        self.fix_attempts.clear();
        self.store.remove_under::<PendingFixKey>(&inner.session_id);
        self.set_state(&mut inner, CoordinatorState::Idle);
        self.events.publish(CanvasEvent::EntriesReplaced {
            message_key: String::new(),
            entry_ids: Vec::new(),
        });
    }

    fn reset(inner: &mut Inner) {
        inner.view.clear();
        inner.outputs.clear();
        inner.run_states.clear();
        inner.renamed.clear();
        inner.pending = false;
        inner.last_auto_run = None;
    }

    /// Re-key everything created under `key` (a positional fallback) to the
    /// backend id that just arrived.  Returns how many entries moved.
    pub fn assign_message_id(&self, key: &str, backend_id: &str) -> usize {
        if key == backend_id {
            return 0;
        }
        let mut inner = self.inner.lock();
        let moved: Vec<(String, String)> = inner
            .view
            .entries()
            .iter()
            .filter(|e| e.message_key == key)
            .map(|e| (e.id.clone(), entry_id(backend_id, &e.language)))
            .collect();
        if moved.is_empty() {
            return 0;
        }

        for (old, new) in &moved {
            if let Some(entry) = inner.view.entry_mut(old) {
                entry.id.clone_from(new);
                entry.message_key = backend_id.to_owned();
                entry.source_message_id = Some(backend_id.to_owned());
            }
            inner.view.rename_entry(old, new);
            if let Some(state) = inner.run_states.remove(old) {
                inner.run_states.insert(new.clone(), state);
            }
            self.fix_attempts.rename(old, new);
            inner.renamed.insert(old.clone(), new.clone());
        }

        if let Some(mut outputs) = inner.outputs.remove(key) {
            for out in &mut outputs {
                out.source_message_id = backend_id.to_owned();
                if let Some((_, new)) = moved.iter().find(|(old, _)| *old == out.code_entry_id) {
                    out.code_entry_id.clone_from(new);
                }
            }
            inner.outputs.insert(backend_id.to_owned(), outputs);
        }
        if let Some(mark) = inner.last_auto_run.as_mut().filter(|m| m.key == key) {
            mark.key = backend_id.to_owned();
        }
        drop(inner);

        tracing::debug!(from = %key, to = %backend_id, entries = moved.len(), "message id assigned");
        self.events.publish(CanvasEvent::EntriesReplaced {
            message_key: backend_id.to_owned(),
            entry_ids: moved.iter().map(|(_, new)| new.clone()).collect(),
        });
        moved.len()
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.events.notice(level, message);
    }

    fn set_state(&self, inner: &mut Inner, state: CoordinatorState) {
        if inner.state == state {
            return;
        }
        inner.state = state;
        self.events.publish(CanvasEvent::StateChanged {
            state,
            session_id: inner.session_id.clone(),
        });
    }
}

/// Turn an execute response (or its failure) into the message's new output
/// set: at most one error, at most one text output, any number of charts.
fn classify(
    result: BackendResult<ExecuteResponse>,
    message_key: &str,
    entry_id: &str,
) -> Vec<ExecutionOutput> {
    let resp = match result {
        Ok(resp) => resp,
        Err(e) => {
            return vec![ExecutionOutput::error(
                format!("Execution failed: {e}"),
                message_key,
                entry_id,
            )]
        }
    };

    let mut outputs = Vec::new();
    if let Some(text) = resp.output.filter(|t| !t.is_empty()) {
        outputs.push(ExecutionOutput::output(text, message_key, entry_id));
    }
    if let Some(err) = resp.error.filter(|t| !t.trim().is_empty()) {
        outputs.push(ExecutionOutput::error(err, message_key, entry_id));
    }
    for chart in resp.chart_outputs {
        outputs.push(ExecutionOutput::chart(chart, message_key, entry_id));
    }
    outputs
}
