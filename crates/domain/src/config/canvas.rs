use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Canvas behaviour
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Execute extracted code automatically once an assistant turn completes.
    #[serde(default = "d_true")]
    pub auto_run: bool,
    /// Languages the execution backend can run.  Everything else is
    /// display-only.
    #[serde(default = "d_exec_langs")]
    pub executable_languages: Vec<String>,
    /// After the canvas is opened, replayed turn-completion signals inside
    /// this window are ignored.
    #[serde(default = "d_750")]
    pub open_suppression_ms: u64,
    /// Fence language reserved for the chart renderer.
    #[serde(default = "d_chart")]
    pub chart_language: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            auto_run: true,
            executable_languages: d_exec_langs(),
            open_suppression_ms: 750,
            chart_language: d_chart(),
        }
    }
}

impl CanvasConfig {
    pub fn is_executable(&self, language: &str) -> bool {
        self.executable_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_exec_langs() -> Vec<String> {
    vec!["python".into()]
}
fn d_750() -> u64 {
    750
}
fn d_chart() -> String {
    "chart".into()
}
