use serde::Serialize;

/// Structured trace events emitted across all DataChat crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    BackendCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    CodeExtracted {
        message_key: String,
        entries: usize,
        languages: Vec<String>,
    },
    AutoRunFired {
        session_id: String,
        turn: u64,
        entries: usize,
    },
    ExecutionFinished {
        session_id: String,
        entry_id: String,
        message_key: String,
        outputs: usize,
        failed: bool,
        duration_ms: u64,
    },
    StaleResponseDropped {
        operation: String,
        requested_session: String,
        active_session: String,
    },
    FixAttempted {
        entry_id: String,
        attempt: u32,
        paid: bool,
        applied: bool,
    },
    CreditsDeducted {
        user_id: String,
        amount: u64,
        remote_confirmed: bool,
    },
    CreditsReconciled {
        user_id: String,
        replayed: u64,
        remaining: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "dc_event");
    }
}
