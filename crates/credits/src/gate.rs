//! Cached credit ledger with optimistic deduction.
//!
//! Reads (`has_enough`, `tier_allows`) only look at the cache.  `deduct`
//! always lowers the cached balance first and then tries the remote ledger;
//! a deduction the remote never saw is kept in `pending_local` and replayed
//! by [`CreditGate::reconcile`].  A timed-out deduction may have landed, so
//! it is never replayed; the next refresh settles the balance instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use dc_backend::ExecutionBackend;
use dc_domain::config::CreditsConfig;
use dc_domain::credit::{CreditLedger, Feature, Tier};
use dc_domain::error::{Error, Result};
use dc_domain::trace::TraceEvent;
use dc_sessions::{CreditSnapshotKey, SessionStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a deduction was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductOutcome {
    /// Unlimited ledger: nothing was deducted.
    Unlimited,
    /// The remote ledger accepted the deduction.
    Confirmed,
    /// The remote ledger was unreachable.  Applied locally, replayed later.
    LocalOnly,
    /// The remote ledger answered with an error or timed out.  Still
    /// counted as success.
    AcceptedUnconfirmed,
}

impl DeductOutcome {
    /// Every outcome lets the paid operation proceed.
    pub fn succeeded(self) -> bool {
        true
    }
}

/// Read model for `GET /v1/credits` and `datachat credits`.
#[derive(Debug, Clone, Serialize)]
pub struct CreditStatus {
    pub user_id: String,
    pub loaded: bool,
    pub unlimited: bool,
    pub tier: Tier,
    pub total: u64,
    pub used: u64,
    pub remaining: u64,
    pub reset_date: Option<DateTime<Utc>>,
    /// Credits deducted locally that the remote ledger has not seen yet.
    pub pending_local: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct GateState {
    ledger: Option<CreditLedger>,
    pending_local: u64,
    refreshed_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CreditGate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CreditGate {
    user_id: String,
    config: CreditsConfig,
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<SessionStore>,
    state: RwLock<GateState>,
}

impl CreditGate {
    /// Build a gate for `user_id`, warming the cache from the last stored
    /// snapshot when one is still live.
    pub fn new(
        user_id: impl Into<String>,
        config: CreditsConfig,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<SessionStore>,
    ) -> Self {
        let user_id = user_id.into();
        let ledger = store.get::<CreditSnapshotKey>(&user_id);
        if let Some(l) = &ledger {
            tracing::debug!(
                user_id = %user_id,
                remaining = l.remaining(),
                tier = ?l.tier,
                "credit gate warmed from snapshot"
            );
        }
        Self {
            user_id,
            config,
            backend,
            store,
            state: RwLock::new(GateState {
                ledger,
                ..GateState::default()
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &CreditsConfig {
        &self.config
    }

    /// The cached ledger, if one has been loaded.
    pub fn ledger(&self) -> Option<CreditLedger> {
        self.state.read().ledger.clone()
    }

    pub fn is_unlimited(&self) -> bool {
        self.state
            .read()
            .ledger
            .as_ref()
            .is_some_and(|l| l.is_unlimited(self.config.unlimited_sentinel))
    }

    /// Fetch the remote ledger into the cache and snapshot it.
    ///
    /// Local-only deductions that have not been replayed yet stay applied on
    /// top of the fetched balance.
    pub async fn refresh(&self) -> Result<CreditLedger> {
        let fetched: CreditLedger = self.backend.get_credits(&self.user_id).await?.into();

        let ledger = {
            let mut state = self.state.write();
            let mut ledger = fetched;
            if !ledger.is_unlimited(self.config.unlimited_sentinel) {
                ledger.used = ledger.used.saturating_add(state.pending_local);
            }
            state.ledger = Some(ledger.clone());
            state.refreshed_at = Some(Utc::now());
            ledger
        };

        if let Err(e) = self.store.put::<CreditSnapshotKey>(&self.user_id, &ledger) {
            tracing::warn!(error = %e, "failed to snapshot credit ledger");
        }
        Ok(ledger)
    }

    /// Whether the cached balance covers `amount`.  Without a loaded ledger
    /// only a zero amount is affordable.
    pub fn has_enough(&self, amount: u64) -> bool {
        if amount == 0 {
            return true;
        }
        let state = self.state.read();
        match &state.ledger {
            Some(l) if l.is_unlimited(self.config.unlimited_sentinel) => true,
            Some(l) => l.remaining() >= amount,
            None => false,
        }
    }

    /// Remaining credits as cached (`u64::MAX` when unlimited, 0 if unknown).
    pub fn remaining(&self) -> u64 {
        let state = self.state.read();
        match &state.ledger {
            Some(l) if l.is_unlimited(self.config.unlimited_sentinel) => u64::MAX,
            Some(l) => l.remaining(),
            None => 0,
        }
    }

    /// Whether the user's tier unlocks `feature`.  An unknown ledger counts
    /// as the free tier.
    pub fn tier_allows(&self, feature: Feature) -> bool {
        let state = self.state.read();
        let tier = match &state.ledger {
            Some(l) if l.is_unlimited(self.config.unlimited_sentinel) => return true,
            Some(l) => l.tier,
            None => Tier::Free,
        };
        tier >= self.config.min_tier(feature)
    }

    /// Deduct `amount`.  See [`CreditGate::deduct_detailed`].
    pub async fn deduct(&self, amount: u64) -> bool {
        self.deduct_detailed(amount).await.succeeded()
    }

    /// Deduct `amount`: lower the cached balance, then tell the remote
    /// ledger.
    ///
    /// A remote failure never blocks the caller.  A request that never
    /// reached the ledger is remembered and replayed on the next reconcile.
    /// A timeout or an error answer is logged and accepted as-is.
    pub async fn deduct_detailed(&self, amount: u64) -> DeductOutcome {
        if self.is_unlimited() {
            return DeductOutcome::Unlimited;
        }
        if amount == 0 {
            return DeductOutcome::Confirmed;
        }

        if let Some(l) = self.state.write().ledger.as_mut() {
            l.used = l.used.saturating_add(amount);
        }

        let outcome = match self.backend.deduct_credits(&self.user_id, amount).await {
            Ok(()) => DeductOutcome::Confirmed,
            Err(e @ Error::Http(_)) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    amount,
                    error = %e,
                    "credit ledger unreachable, deduction kept locally"
                );
                self.state.write().pending_local += amount;
                DeductOutcome::LocalOnly
            }
            Err(e @ Error::Timeout(_)) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    amount,
                    error = %e,
                    "credit ledger timed out, deduction left to the next refresh"
                );
                DeductOutcome::AcceptedUnconfirmed
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    amount,
                    error = %e,
                    "credit ledger rejected deduction, treating as success"
                );
                DeductOutcome::AcceptedUnconfirmed
            }
        };

        TraceEvent::CreditsDeducted {
            user_id: self.user_id.clone(),
            amount,
            remote_confirmed: outcome == DeductOutcome::Confirmed,
        }
        .emit();

        self.snapshot_to_store();
        outcome
    }

    /// Replay local-only deductions, then refresh from the remote ledger.
    pub async fn reconcile(&self) -> Result<CreditLedger> {
        let pending = std::mem::take(&mut self.state.write().pending_local);
        let mut replayed = 0;

        if pending > 0 {
            match self.backend.deduct_credits(&self.user_id, pending).await {
                Ok(()) => replayed = pending,
                Err(e @ Error::Http(_)) => {
                    self.state.write().pending_local += pending;
                    return Err(e);
                }
                Err(e @ Error::Timeout(_)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        amount = pending,
                        error = %e,
                        "replayed deduction timed out, not retrying"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        amount = pending,
                        error = %e,
                        "credit ledger rejected replayed deduction, dropping it"
                    );
                }
            }
        }

        let ledger = self.refresh().await?;
        TraceEvent::CreditsReconciled {
            user_id: self.user_id.clone(),
            replayed,
            remaining: ledger.remaining(),
        }
        .emit();
        Ok(ledger)
    }

    pub fn status(&self) -> CreditStatus {
        let state = self.state.read();
        let unlimited = state
            .ledger
            .as_ref()
            .is_some_and(|l| l.is_unlimited(self.config.unlimited_sentinel));
        let (tier, total, used, remaining, reset_date) = match &state.ledger {
            Some(l) => (l.tier, l.total, l.used, l.remaining(), l.reset_date),
            None => (Tier::Free, 0, 0, 0, None),
        };
        CreditStatus {
            user_id: self.user_id.clone(),
            loaded: state.ledger.is_some(),
            unlimited,
            tier,
            total,
            used,
            remaining,
            reset_date,
            pending_local: state.pending_local,
            refreshed_at: state.refreshed_at,
        }
    }

    fn snapshot_to_store(&self) {
        let Some(ledger) = self.ledger() else {
            return;
        };
        if let Err(e) = self.store.put::<CreditSnapshotKey>(&self.user_id, &ledger) {
            tracing::warn!(error = %e, "failed to snapshot credit ledger");
        }
    }
}
