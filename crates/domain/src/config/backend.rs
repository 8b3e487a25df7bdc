use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution backend connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "d_backend_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout.  Code execution can be slow, so this is generous.
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
    /// Retries for idempotent calls only.  `execute` and `deduct` are never
    /// retried.
    #[serde(default = "d_2")]
    pub max_retries: u32,
    #[serde(default = "d_user")]
    pub user_id: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: d_backend_url(),
            api_key: None,
            timeout_ms: 30_000,
            max_retries: 2,
            user_id: d_user(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_backend_url() -> String {
    "http://localhost:8000".into()
}
fn d_30000() -> u64 {
    30_000
}
fn d_2() -> u32 {
    2
}
fn d_user() -> String {
    "default_user".into()
}
