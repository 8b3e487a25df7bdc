use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Session-scoped key/value store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file the store is persisted to.  `None` keeps it in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "d_600")]
    pub pending_fix_ttl_secs: u64,
    #[serde(default = "d_300")]
    pub credit_snapshot_ttl_secs: u64,
    #[serde(default = "d_30")]
    pub flush_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            pending_fix_ttl_secs: 600,
            credit_snapshot_ttl_secs: 300,
            flush_interval_secs: 30,
        }
    }
}

fn d_600() -> u64 {
    600
}
fn d_300() -> u64 {
    300
}
fn d_30() -> u64 {
    30
}
