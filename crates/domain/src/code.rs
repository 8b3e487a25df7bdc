use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Code entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One runnable (or display-only) code unit on the canvas.
///
/// Built from every fenced block of one language in one message.  The
/// `message_key` is what outputs are indexed by: the backend message id when
/// one was known at extraction time, otherwise a positional fallback key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub id: String,
    pub language: String,
    pub code: String,
    pub message_key: String,
    /// Backend-assigned id of the source message, when known.
    #[serde(default)]
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_executing: bool,
    pub title: String,
    /// Agents whose blocks were merged into this entry, in encounter order.
    #[serde(default)]
    pub agents: Vec<String>,
}

/// Per-entry execution state, tracked alongside the coordinator state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotRun,
    Running,
    Succeeded,
    Failed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Output,
    Error,
    Chart,
}

/// A single result of executing a message's code.
///
/// `content` is a JSON string for `output`/`error` and the chart figure for
/// `chart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub content: serde_json::Value,
    pub source_message_id: String,
    pub code_entry_id: String,
}

impl ExecutionOutput {
    pub fn output(text: impl Into<String>, message_key: &str, entry_id: &str) -> Self {
        Self::new(OutputKind::Output, serde_json::Value::String(text.into()), message_key, entry_id)
    }

    pub fn error(text: impl Into<String>, message_key: &str, entry_id: &str) -> Self {
        Self::new(OutputKind::Error, serde_json::Value::String(text.into()), message_key, entry_id)
    }

    pub fn chart(figure: serde_json::Value, message_key: &str, entry_id: &str) -> Self {
        Self::new(OutputKind::Chart, figure, message_key, entry_id)
    }

    fn new(kind: OutputKind, content: serde_json::Value, message_key: &str, entry_id: &str) -> Self {
        Self {
            kind,
            content,
            source_message_id: message_key.to_owned(),
            code_entry_id: entry_id.to_owned(),
        }
    }

    /// Text content for `output` and `error` records.
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }

    pub fn is_error(&self) -> bool {
        self.kind == OutputKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_serializes_with_type_tag() {
        let out = ExecutionOutput::output("1\n", "m1", "m1:python");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["content"], "1\n");
        assert_eq!(json["source_message_id"], "m1");
    }

    #[test]
    fn chart_has_no_text() {
        let out = ExecutionOutput::chart(serde_json::json!({"data": []}), "m1", "e1");
        assert!(out.text().is_none());
        assert!(!out.is_error());
    }
}
