use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use dc_domain::config::StoreConfig;
use dc_domain::credit::CreditLedger;

/// A typed slot in the [`SessionStore`](crate::SessionStore).
pub trait StoreKey {
    /// Stable on-disk name.  Must be unique across keys.
    const NAME: &'static str;
    type Value: Serialize + DeserializeOwned;

    /// How long a stored value stays readable.  `None` = until removed.
    fn ttl(cfg: &StoreConfig) -> Option<Duration>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Defined keys
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fix request that was handed to the fix service and has not come back
/// yet.  Scoped by [`pending_fix_scope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFix {
    pub entry_id: String,
    pub error_text: String,
    pub code: String,
    pub attempt: u32,
    pub requested_at: DateTime<Utc>,
}

pub struct PendingFixKey;

/// Scope of a [`PendingFix`]: one slot per entry of a chat session.
pub fn pending_fix_scope(session_id: &str, entry_id: &str) -> String {
    format!("{session_id}/{entry_id}")
}

impl StoreKey for PendingFixKey {
    const NAME: &'static str = "pending_fix";
    type Value = PendingFix;

    fn ttl(cfg: &StoreConfig) -> Option<Duration> {
        Some(secs(cfg.pending_fix_ttl_secs))
    }
}

/// Last credit ledger seen from the backend.  Scoped by user id.
pub struct CreditSnapshotKey;

impl StoreKey for CreditSnapshotKey {
    const NAME: &'static str = "credit_snapshot";
    type Value = CreditLedger;

    fn ttl(cfg: &StoreConfig) -> Option<Duration> {
        Some(secs(cfg.credit_snapshot_ttl_secs))
    }
}

/// Message id the backend was last told code belongs to.  Scoped by chat
/// session.
pub struct ActiveMessageKey;

impl StoreKey for ActiveMessageKey {
    const NAME: &'static str = "active_message";
    type Value = String;

    fn ttl(_cfg: &StoreConfig) -> Option<Duration> {
        None
    }
}

/// Clamped to a century so absurd config values cannot overflow chrono.
fn secs(n: u64) -> Duration {
    const CENTURY_SECS: u64 = 100 * 365 * 24 * 3600;
    Duration::seconds(n.min(CENTURY_SECS) as i64)
}
