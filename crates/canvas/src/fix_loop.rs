//! AI-assisted fix loop.
//!
//! Each entry gets `free_fix_attempts` free fixes per turn; later attempts
//! cost `fix_cost` credits each.  The tier gate and the credit check both
//! run before the fix service is called.  A fix replaces the entry's code
//! and clears its error output but never runs it.

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use dc_backend::FixRequest;
use dc_credits::{CreditGate, DeductOutcome};
use dc_domain::code::CodeEntry;
use dc_domain::credit::Feature;
use dc_domain::trace::TraceEvent;
use dc_sessions::{pending_fix_scope, PendingFix, PendingFixKey};

use crate::coordinator::ExecutionCoordinator;
use crate::error::CanvasError;
use crate::events::{CanvasEvent, NoticeLevel};

static ERROR_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)error|traceback").expect("error regex is valid"));

/// A fix that was applied.
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub entry: CodeEntry,
    pub attempt: u32,
    pub paid: bool,
    pub deduction: Option<DeductOutcome>,
}

/// Read model for the fix button.
#[derive(Debug, Clone, Serialize)]
pub struct FixAvailability {
    pub entry_id: String,
    pub can_offer: bool,
    pub attempts: u32,
    pub free_remaining: u32,
    pub next_attempt_paid: bool,
    pub next_attempt_cost: u64,
    pub tier_allows: bool,
    /// A fix request for this entry still waiting on the fix service.
    pub pending: Option<PendingFix>,
}

pub struct FixLoopController {
    coordinator: Arc<ExecutionCoordinator>,
    credits: Arc<CreditGate>,
}

impl FixLoopController {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, credits: Arc<CreditGate>) -> Self {
        Self {
            coordinator,
            credits,
        }
    }

    fn free_attempts(&self) -> u32 {
        self.credits.config().free_fix_attempts
    }

    fn fix_cost(&self) -> u64 {
        self.credits.config().fix_cost
    }

    /// Whether the UI should offer a fix for `entry_id`: it has an error
    /// output, or its code looks like an error and it has a fix counter.
    pub fn can_offer_fix(&self, entry_id: &str) -> bool {
        let Some(entry) = self.coordinator.entry(entry_id) else {
            return false;
        };
        if self.coordinator.last_error(&entry.id).is_some() {
            return true;
        }
        ERROR_LIKE.is_match(&entry.code) && self.coordinator.fix_attempts().contains(&entry.id)
    }

    pub fn availability(&self, entry_id: &str) -> Result<FixAvailability, CanvasError> {
        let entry = self
            .coordinator
            .entry(entry_id)
            .ok_or_else(|| CanvasError::UnknownEntry(entry_id.to_owned()))?;
        let attempts = self.coordinator.fix_attempts().get(&entry.id);
        let next_attempt_paid = attempts + 1 > self.free_attempts();
        Ok(FixAvailability {
            can_offer: self.can_offer_fix(&entry.id),
            entry_id: entry.id.clone(),
            attempts,
            free_remaining: self.free_attempts().saturating_sub(attempts),
            next_attempt_paid,
            next_attempt_cost: if next_attempt_paid { self.fix_cost() } else { 0 },
            tier_allows: self.credits.tier_allows(Feature::AiFix),
            pending: self.pending_fix(&entry.id),
        })
    }

    /// The in-flight fix request for `entry_id`, if any.  Survives a restart
    /// when the store is persisted, until its TTL runs out.
    pub fn pending_fix(&self, entry_id: &str) -> Option<PendingFix> {
        let scope = pending_fix_scope(&self.coordinator.session_id(), entry_id);
        self.coordinator.store().get::<PendingFixKey>(&scope)
    }

    /// Ask the fix service to repair `code`, which failed with `error_text`.
    ///
    /// Short-circuits without a service call or a counted attempt when the
    /// error text is empty, the tier lacks the feature, or a paid attempt
    /// is unaffordable.  A transport failure does not count as an attempt;
    /// a service refusal does.
    pub async fn request_fix(
        &self,
        entry_id: &str,
        error_text: &str,
        code: &str,
    ) -> Result<FixOutcome, CanvasError> {
        if error_text.trim().is_empty() {
            return Err(CanvasError::EmptyErrorText);
        }
        let entry = self
            .coordinator
            .entry(entry_id)
            .ok_or_else(|| CanvasError::UnknownEntry(entry_id.to_owned()))?;
        let id = entry.id.clone();

        if !self.credits.tier_allows(Feature::AiFix) {
            self.coordinator
                .notice(NoticeLevel::Warning, "AI fix requires a plan upgrade");
            return Err(CanvasError::RequiresUpgrade {
                feature: Feature::AiFix,
            });
        }

        let attempts = self.coordinator.fix_attempts();
        let attempt = attempts.get(&id) + 1;
        let paid = attempt > self.free_attempts();
        let cost = self.fix_cost();
        if paid && !self.credits.has_enough(cost) {
            let remaining = self.credits.remaining();
            self.coordinator.notice(
                NoticeLevel::Warning,
                format!("Not enough credits for another fix ({cost} needed)"),
            );
            return Err(CanvasError::InsufficientCredits {
                required: cost,
                remaining,
            });
        }

        // One fix per entry at a time, so two requests cannot claim the
        // same attempt number.
        let _permit = self.coordinator.run_locks().try_acquire(&format!("fix:{id}"))?;

        let session_id = self.coordinator.session_id();
        let store = self.coordinator.store();
        let scope = pending_fix_scope(&session_id, &id);
        let pending = PendingFix {
            entry_id: id.clone(),
            error_text: error_text.to_owned(),
            code: code.to_owned(),
            attempt,
            requested_at: Utc::now(),
        };
        if let Err(e) = store.put::<PendingFixKey>(&scope, &pending) {
            tracing::debug!(error = %e, "could not record pending fix");
        }

        tracing::info!(entry_id = %id, attempt, paid, "requesting fix");
        let result = self
            .coordinator
            .backend()
            .fix(FixRequest {
                code: code.to_owned(),
                error_text: error_text.to_owned(),
                session_id: session_id.clone(),
            })
            .await;
        store.remove::<PendingFixKey>(&scope);

        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_transport() => {
                tracing::warn!(entry_id = %id, attempt, error = %e, "fix service unreachable");
                self.coordinator
                    .notice(NoticeLevel::Error, "Network error while requesting a fix");
                return Err(CanvasError::Network(e.to_string()));
            }
            Err(e) => {
                attempts.commit(&id, attempt);
                self.record(&id, attempt, paid, false);
                self.coordinator
                    .notice(NoticeLevel::Error, format!("Fix failed: {e}"));
                return Err(CanvasError::Service(e.to_string()));
            }
        };

        self.coordinator
            .ensure_current("fix", &session_id, resp.session_id.as_deref())?;

        let fixed = match (resp.fixed_code, resp.error) {
            (Some(code), _) if !code.trim().is_empty() => code,
            (_, Some(err)) => {
                attempts.commit(&id, attempt);
                self.record(&id, attempt, paid, false);
                self.coordinator
                    .notice(NoticeLevel::Error, format!("Fix failed: {err}"));
                return Err(CanvasError::Service(err));
            }
            _ => {
                attempts.commit(&id, attempt);
                self.record(&id, attempt, paid, false);
                return Err(CanvasError::Service("fix service returned no code".into()));
            }
        };

        let entry = self.coordinator.apply_patch(&id, fixed, true)?;
        attempts.commit(&id, attempt);
        let deduction = if paid {
            Some(self.credits.deduct_detailed(cost).await)
        } else {
            None
        };
        self.record(&id, attempt, paid, true);
        self.coordinator.notice(
            NoticeLevel::Info,
            "Fix applied. Run the code again to check it.",
        );

        Ok(FixOutcome {
            entry,
            attempt,
            paid,
            deduction,
        })
    }

    fn record(&self, entry_id: &str, attempt: u32, paid: bool, applied: bool) {
        TraceEvent::FixAttempted {
            entry_id: entry_id.to_owned(),
            attempt,
            paid,
            applied,
        }
        .emit();
        self.coordinator.events().publish(CanvasEvent::FixAttempted {
            entry_id: entry_id.to_owned(),
            attempt,
            paid,
            applied,
        });
    }
}
