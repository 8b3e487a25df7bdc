//! Canvas change notifications.
//!
//! Every state change the surrounding UI needs to redraw is published on a
//! `broadcast` channel.  Slow subscribers lag and miss events; they recover
//! by re-reading the snapshot.

use serde::Serialize;
use tokio::sync::broadcast;

use dc_domain::code::{CodeEntry, ExecutionOutput, RunState};

use crate::coordinator::CoordinatorState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasEvent {
    StateChanged {
        state: CoordinatorState,
        session_id: String,
    },
    EntriesReplaced {
        message_key: String,
        entry_ids: Vec<String>,
    },
    EntryUpdated {
        entry: CodeEntry,
    },
    RunStateChanged {
        entry_id: String,
        state: RunState,
    },
    OutputsReplaced {
        message_key: String,
        outputs: Vec<ExecutionOutput>,
    },
    ActiveChanged {
        entry_id: String,
    },
    VisibilityChanged {
        visible: bool,
    },
    FixAttempted {
        entry_id: String,
        attempt: u32,
        paid: bool,
        applied: bool,
    },
    /// Toast-style message for the user.
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

pub struct EventBus {
    tx: broadcast::Sender<CanvasEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers.  Having none is fine.
    pub fn publish(&self, event: CanvasEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(CanvasEvent::Notice {
            level,
            message: message.into(),
        });
    }
}
