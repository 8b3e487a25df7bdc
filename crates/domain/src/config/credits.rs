use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::credit::{Feature, Tier};

/// Credit costs, the free fix allowance, and the tier table.
///
/// `features` maps each gated feature to the lowest tier allowed to use it.
/// A feature missing from the map is open to every tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Fix attempts per entry (per turn) that cost nothing.
    #[serde(default = "d_3")]
    pub free_fix_attempts: u32,
    #[serde(default = "d_1")]
    pub fix_cost: u64,
    #[serde(default = "d_1")]
    pub edit_cost: u64,
    #[serde(default)]
    pub cleanup_cost: u64,
    #[serde(default = "d_60")]
    pub reconcile_interval_secs: u64,
    /// A ledger total at or above this value means "unlimited".
    #[serde(default = "d_sentinel")]
    pub unlimited_sentinel: u64,
    #[serde(default = "d_features")]
    pub features: BTreeMap<Feature, Tier>,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            free_fix_attempts: 3,
            fix_cost: 1,
            edit_cost: 1,
            cleanup_cost: 0,
            reconcile_interval_secs: 60,
            unlimited_sentinel: d_sentinel(),
            features: d_features(),
        }
    }
}

impl CreditsConfig {
    /// Lowest tier allowed to use `feature`.
    pub fn min_tier(&self, feature: Feature) -> Tier {
        self.features.get(&feature).copied().unwrap_or(Tier::Free)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3() -> u32 {
    3
}
fn d_1() -> u64 {
    1
}
fn d_60() -> u64 {
    60
}
fn d_sentinel() -> u64 {
    999_999_999
}
fn d_features() -> BTreeMap<Feature, Tier> {
    BTreeMap::from([
        (Feature::AiFix, Tier::Free),
        (Feature::CodeCleanup, Tier::Free),
        (Feature::AiEdit, Tier::Pro),
    ])
}
