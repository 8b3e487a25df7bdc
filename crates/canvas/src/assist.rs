//! AI edit and cleanup.
//!
//! Same pipeline as the fix loop without the free allowance: tier gate,
//! credit check, service call, patch.  The patched code is never run.

use std::sync::Arc;

use serde::Serialize;

use dc_backend::{CleanCodeRequest, EditRequest};
use dc_credits::{CreditGate, DeductOutcome};
use dc_domain::code::CodeEntry;
use dc_domain::credit::Feature;

use crate::coordinator::ExecutionCoordinator;
use crate::error::CanvasError;
use crate::events::NoticeLevel;

#[derive(Debug, Clone, Serialize)]
pub struct AssistOutcome {
    pub entry: CodeEntry,
    pub feature: Feature,
    pub cost: u64,
    pub deduction: Option<DeductOutcome>,
}

pub struct AssistController {
    coordinator: Arc<ExecutionCoordinator>,
    credits: Arc<CreditGate>,
}

impl AssistController {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, credits: Arc<CreditGate>) -> Self {
        Self {
            coordinator,
            credits,
        }
    }

    /// Rewrite an entry's code following a natural-language instruction.
    pub async fn request_edit(
        &self,
        entry_id: &str,
        prompt: &str,
    ) -> Result<AssistOutcome, CanvasError> {
        if prompt.trim().is_empty() {
            return Err(CanvasError::EmptyPrompt);
        }
        let cost = self.credits.config().edit_cost;
        let (id, code) = self.admit(entry_id, Feature::AiEdit, cost)?;
        let session_id = self.coordinator.session_id();

        let resp = self
            .coordinator
            .backend()
            .edit(EditRequest {
                original_code: code,
                user_prompt: prompt.to_owned(),
                session_id: session_id.clone(),
            })
            .await
            .map_err(|e| self.failed(Feature::AiEdit, e.into()))?;
        self.coordinator
            .ensure_current("edit", &session_id, resp.session_id.as_deref())?;

        let edited = match (resp.edited_code, resp.error) {
            (Some(code), _) if !code.trim().is_empty() => code,
            (_, Some(err)) => return Err(self.failed(Feature::AiEdit, CanvasError::Service(err))),
            _ => {
                return Err(self.failed(
                    Feature::AiEdit,
                    CanvasError::Service("edit service returned no code".into()),
                ))
            }
        };
        self.finish(&id, edited, Feature::AiEdit, cost).await
    }

    /// Tidy an entry's code without changing what it does.
    pub async fn request_cleanup(&self, entry_id: &str) -> Result<AssistOutcome, CanvasError> {
        let cost = self.credits.config().cleanup_cost;
        let (id, code) = self.admit(entry_id, Feature::CodeCleanup, cost)?;
        let session_id = self.coordinator.session_id();

        let resp = self
            .coordinator
            .backend()
            .clean_code(CleanCodeRequest {
                code,
                session_id: session_id.clone(),
            })
            .await
            .map_err(|e| self.failed(Feature::CodeCleanup, e.into()))?;
        self.coordinator
            .ensure_current("clean_code", &session_id, resp.session_id.as_deref())?;

        self.finish(&id, resp.cleaned_code, Feature::CodeCleanup, cost)
            .await
    }

    /// Gate checks.  Returns the resolved entry id and the code to send.
    fn admit(
        &self,
        entry_id: &str,
        feature: Feature,
        cost: u64,
    ) -> Result<(String, String), CanvasError> {
        let entry = self
            .coordinator
            .entry(entry_id)
            .ok_or_else(|| CanvasError::UnknownEntry(entry_id.to_owned()))?;
        if !self.credits.tier_allows(feature) {
            self.coordinator.notice(
                NoticeLevel::Warning,
                format!("{feature} requires a plan upgrade"),
            );
            return Err(CanvasError::RequiresUpgrade { feature });
        }
        if !self.credits.has_enough(cost) {
            return Err(CanvasError::InsufficientCredits {
                required: cost,
                remaining: self.credits.remaining(),
            });
        }
        let code = self
            .coordinator
            .code_to_run(&entry.id)
            .unwrap_or(entry.code);
        Ok((entry.id, code))
    }

    async fn finish(
        &self,
        entry_id: &str,
        code: String,
        feature: Feature,
        cost: u64,
    ) -> Result<AssistOutcome, CanvasError> {
        let entry = self.coordinator.apply_patch(entry_id, code, false)?;
        let deduction = if cost > 0 {
            Some(self.credits.deduct_detailed(cost).await)
        } else {
            None
        };
        tracing::info!(entry_id = %entry.id, %feature, cost, "assist applied");
        Ok(AssistOutcome {
            entry,
            feature,
            cost,
            deduction,
        })
    }

    fn failed(&self, feature: Feature, err: CanvasError) -> CanvasError {
        tracing::warn!(%feature, error = %err, "assist failed");
        self.coordinator
            .notice(NoticeLevel::Error, format!("{feature} failed: {err}"));
        err
    }
}
