use serde::{Deserialize, Serialize};

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A chart specification attached to a message instead of prose
/// (a plotting-library figure, passed through untouched).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartSpec(pub serde_json::Value);

/// Message body: prose/markdown text, or a standalone chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Chart(ChartSpec),
}

impl MessageBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(t) => Some(t),
            MessageBody::Chart(_) => None,
        }
    }
}

/// A transcript message as seen by the canvas.
///
/// The canvas only ever reads messages.  `id` is assigned by the backend and
/// may be missing for a message that was created optimistically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    pub sender: Sender,
    pub text: MessageBody,
    /// Sub-agent that produced the message, when the backend tags it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl Message {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Sender::Assistant,
            text: MessageBody::Text(text.into()),
            agent: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Sender::User,
            text: MessageBody::Text(text.into()),
            agent: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }
}
