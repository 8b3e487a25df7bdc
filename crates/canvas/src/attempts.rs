use std::collections::HashMap;

use parking_lot::Mutex;

/// Fix attempts per entry for the current turn.
///
/// Counts only go up within a turn.  [`FixAttemptCounter::reset_for`] starts
/// a fresh budget when a new turn's entries land.
#[derive(Debug, Default)]
pub struct FixAttemptCounter {
    counts: Mutex<HashMap<String, u32>>,
}

impl FixAttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts recorded so far (0 when none).
    pub fn get(&self, entry_id: &str) -> u32 {
        self.counts.lock().get(entry_id).copied().unwrap_or(0)
    }

    /// Whether `entry_id` has a counter in this turn.
    pub fn contains(&self, entry_id: &str) -> bool {
        self.counts.lock().contains_key(entry_id)
    }

    /// Make sure `entry_id` has a counter, keeping any existing count.
    pub fn ensure(&self, entry_id: &str) {
        self.counts.lock().entry(entry_id.to_owned()).or_insert(0);
    }

    /// Record that attempt number `attempt` happened.  Never lowers a count.
    pub fn commit(&self, entry_id: &str, attempt: u32) -> u32 {
        let mut counts = self.counts.lock();
        let slot = counts.entry(entry_id.to_owned()).or_insert(0);
        *slot = (*slot).max(attempt);
        *slot
    }

    /// Drop every counter and start `entry_ids` at zero.
    pub fn reset_for<'a>(&self, entry_ids: impl IntoIterator<Item = &'a str>) {
        let mut counts = self.counts.lock();
        counts.clear();
        for id in entry_ids {
            counts.insert(id.to_owned(), 0);
        }
    }

    pub fn rename(&self, old: &str, new: &str) {
        let mut counts = self.counts.lock();
        if let Some(n) = counts.remove(old) {
            counts.insert(new.to_owned(), n);
        }
    }

    pub fn clear(&self) {
        self.counts.lock().clear();
    }

    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.counts.lock().clone()
    }
}
