use std::collections::HashMap;

use shared::domain::{HistoryEntryId, ScanHistoryEntry, UserId};

/// Append-only, in-memory log of finished scans for one signed-in session.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: HashMap<UserId, Vec<ScanHistoryEntry>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ScanHistoryEntry) {
        self.entries.entry(entry.user_id).or_default().push(entry);
    }

    /// Newest first.
    pub fn list_for(&self, user_id: UserId) -> Vec<&ScanHistoryEntry> {
        self.entries
            .get(&user_id)
            .map(|entries| entries.iter().rev().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, user_id: UserId, entry_id: HistoryEntryId) -> Option<&ScanHistoryEntry> {
        self.entries
            .get(&user_id)?
            .iter()
            .find(|entry| entry.entry_id == entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
