use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription level.  Ordered: a higher tier includes every feature a
/// lower one grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Team,
    Unlimited,
}

/// Paid or tier-restricted canvas features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AiFix,
    AiEdit,
    CodeCleanup,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::AiFix => "ai_fix",
            Feature::AiEdit => "ai_edit",
            Feature::CodeCleanup => "code_cleanup",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's credit balance as last seen from the remote ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLedger {
    pub total: u64,
    pub used: u64,
    pub tier: Tier,
    #[serde(default)]
    pub reset_date: Option<DateTime<Utc>>,
}

impl CreditLedger {
    /// Whether this ledger never runs out.  Either the tier says so or the
    /// backend reports the sentinel total.
    pub fn is_unlimited(&self, sentinel: u64) -> bool {
        self.tier == Tier::Unlimited || self.total >= sentinel
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}
