//! Reasoning log sets and their merge rules.

pub mod merge;

pub use merge::{combine, compare_entries, merge_one, sort_logs};

use taskdeck_protocol::ReasoningLogEntry;

/// Entries received from the live stream, one per id, in canonical order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveLogSet {
    entries: Vec<ReasoningLogEntry>,
}

impl LiveLogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delivery. A later copy of an id replaces the earlier one.
    pub fn apply(&mut self, entry: ReasoningLogEntry) {
        self.entries = merge_one(&self.entries, entry);
    }

    pub fn entries(&self) -> &[ReasoningLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_set_keeps_one_copy_per_id() {
        let mut live = LiveLogSet::new();
        live.apply(ReasoningLogEntry::new("a", 2, "t").with_status("running"));
        live.apply(ReasoningLogEntry::new("b", 1, "t"));
        live.apply(ReasoningLogEntry::new("a", 2, "t").with_status("done"));

        assert_eq!(live.len(), 2);
        assert_eq!(live.entries()[0].id, "b");
        assert_eq!(live.entries()[1].status, "done");

        live.clear();
        assert!(live.is_empty());
    }
}
