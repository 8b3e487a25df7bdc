use dc_domain::credit::Feature;

/// Caller-facing failure of a canvas operation.
///
/// Execution failures are not here: they become error outputs.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("unknown code entry: {0}")]
    UnknownEntry(String),

    #[error("entry {entry_id} is {language}, which is display-only")]
    NotExecutable { entry_id: String, language: String },

    #[error("entry {0} is already running")]
    EntryBusy(String),

    #[error("entry {0} is not being edited")]
    NotEditing(String),

    #[error("error text must not be empty")]
    EmptyErrorText,

    #[error("edit prompt must not be empty")]
    EmptyPrompt,

    #[error("{feature} requires a plan upgrade")]
    RequiresUpgrade { feature: Feature },

    #[error("insufficient credits: {required} required, {remaining} remaining")]
    InsufficientCredits { required: u64, remaining: u64 },

    /// The session changed while the request was in flight; the result was
    /// dropped.
    #[error("session changed from {requested} to {active}; result discarded")]
    SessionChanged { requested: String, active: String },

    /// The service answered but could not do what was asked.
    #[error("service error: {0}")]
    Service(String),

    /// The service could not be reached.
    #[error("network error: {0}")]
    Network(String),
}

impl CanvasError {
    /// Stable snake_case kind, used as the `code` field of API errors.
    pub fn code(&self) -> &'static str {
        match self {
            CanvasError::UnknownEntry(_) => "unknown_entry",
            CanvasError::NotExecutable { .. } => "not_executable",
            CanvasError::EntryBusy(_) => "entry_busy",
            CanvasError::NotEditing(_) => "not_editing",
            CanvasError::EmptyErrorText => "empty_error_text",
            CanvasError::EmptyPrompt => "empty_prompt",
            CanvasError::RequiresUpgrade { .. } => "requires_upgrade",
            CanvasError::InsufficientCredits { .. } => "insufficient_credits",
            CanvasError::SessionChanged { .. } => "session_changed",
            CanvasError::Service(_) => "service_error",
            CanvasError::Network(_) => "network_error",
        }
    }
}

impl From<dc_domain::error::Error> for CanvasError {
    fn from(e: dc_domain::error::Error) -> Self {
        if e.is_transport() {
            CanvasError::Network(e.to_string())
        } else {
            CanvasError::Service(e.to_string())
        }
    }
}
