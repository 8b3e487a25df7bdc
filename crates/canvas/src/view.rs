//! What the canvas shows: its entries, which one is active, which are being
//! edited, and whether the panel is open.
//!
//! Visibility is independent of content.  Entries can be extracted and run
//! while the panel is hidden.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dc_domain::code::CodeEntry;

use crate::error::CanvasError;

#[derive(Debug, Default)]
pub struct CanvasViewModel {
    entries: Vec<CodeEntry>,
    active: Option<String>,
    /// Scratch buffers for entries in edit mode.
    buffers: HashMap<String, String>,
    visible: bool,
    opened_at: Option<Instant>,
}

impl CanvasViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ── entries ──────────────────────────────────────────────────────

    pub fn entries(&self) -> &[CodeEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &str) -> Option<&CodeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: &str) -> Option<&mut CodeEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Swap in a new entry set.  Buffers of vanished entries are dropped and
    /// the active entry falls back to the first one when it vanished too.
    pub fn replace_entries(&mut self, entries: Vec<CodeEntry>) {
        self.buffers
            .retain(|id, _| entries.iter().any(|e| &e.id == id));
        let keep_active = self
            .active
            .as_ref()
            .is_some_and(|id| entries.iter().any(|e| &e.id == id));
        if !keep_active {
            self.active = entries.first().map(|e| e.id.clone());
        }
        self.entries = entries;
    }

    /// Re-key an entry after its message got a backend id.
    pub fn rename_entry(&mut self, old: &str, new: &str) {
        if let Some(buf) = self.buffers.remove(old) {
            self.buffers.insert(new.to_owned(), buf);
        }
        if self.active.as_deref() == Some(old) {
            self.active = Some(new.to_owned());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buffers.clear();
        self.active = None;
    }

    // ── active entry ─────────────────────────────────────────────────

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, id: &str) -> Result<(), CanvasError> {
        if self.entry(id).is_none() {
            return Err(CanvasError::UnknownEntry(id.to_owned()));
        }
        self.active = Some(id.to_owned());
        Ok(())
    }

    // ── edit mode ────────────────────────────────────────────────────

    /// Enter edit mode, snapshotting the committed code.  Entering twice
    /// keeps the existing buffer.
    pub fn start_edit(&mut self, id: &str) -> Result<&str, CanvasError> {
        let code = self
            .entry(id)
            .map(|e| e.code.clone())
            .ok_or_else(|| CanvasError::UnknownEntry(id.to_owned()))?;
        Ok(self.buffers.entry(id.to_owned()).or_insert(code).as_str())
    }

    pub fn is_editing(&self, id: &str) -> bool {
        self.buffers.contains_key(id)
    }

    pub fn buffer(&self, id: &str) -> Option<&str> {
        self.buffers.get(id).map(String::as_str)
    }

    pub fn editing_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.buffers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn update_buffer(&mut self, id: &str, text: String) -> Result<(), CanvasError> {
        match self.buffers.get_mut(id) {
            Some(buf) => {
                *buf = text;
                Ok(())
            }
            None => Err(CanvasError::NotEditing(id.to_owned())),
        }
    }

    /// Leave edit mode, writing the buffer back to the entry.
    pub fn commit_edit(&mut self, id: &str) -> Result<CodeEntry, CanvasError> {
        let buf = self
            .buffers
            .remove(id)
            .ok_or_else(|| CanvasError::NotEditing(id.to_owned()))?;
        let entry = self
            .entry_mut(id)
            .ok_or_else(|| CanvasError::UnknownEntry(id.to_owned()))?;
        entry.code = buf;
        Ok(entry.clone())
    }

    pub fn cancel_edit(&mut self, id: &str) -> Result<(), CanvasError> {
        self.buffers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CanvasError::NotEditing(id.to_owned()))
    }

    /// The code a run of `id` would execute: the scratch buffer while
    /// editing, the committed code otherwise.
    pub fn code_to_run(&self, id: &str) -> Option<String> {
        self.buffers
            .get(id)
            .cloned()
            .or_else(|| self.entry(id).map(|e| e.code.clone()))
    }

    /// Replace an entry's code.  An open buffer follows the new code.
    pub fn set_code(&mut self, id: &str, code: String) -> Result<CodeEntry, CanvasError> {
        if let Some(buf) = self.buffers.get_mut(id) {
            buf.clone_from(&code);
        }
        let entry = self
            .entry_mut(id)
            .ok_or_else(|| CanvasError::UnknownEntry(id.to_owned()))?;
        entry.code = code;
        Ok(entry.clone())
    }

    // ── visibility ───────────────────────────────────────────────────

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Returns whether visibility changed.
    pub fn set_visible(&mut self, visible: bool, now: Instant) -> bool {
        if self.visible == visible {
            return false;
        }
        self.visible = visible;
        if visible {
            self.opened_at = Some(now);
        }
        true
    }

    pub fn toggle(&mut self, now: Instant) -> bool {
        self.set_visible(!self.visible, now);
        self.visible
    }

    /// Whether the panel was opened less than `window` ago.
    pub fn just_opened(&self, window: Duration, now: Instant) -> bool {
        self.visible
            && self
                .opened_at
                .is_some_and(|at| now.saturating_duration_since(at) < window)
    }
}
