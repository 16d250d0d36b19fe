//! Ordering and deduplication of reasoning logs.
//!
//! All functions are pure: they take the current sets and return a new
//! sequence, so the merged view can be recomputed from its inputs at any time.

use std::cmp::Ordering;
use std::collections::HashMap;

use taskdeck_protocol::ReasoningLogEntry;

/// Canonical order: `sequence`, then `created_at`, then `id`.
///
/// Sequence numbers can collide under concurrent producers and timestamps can
/// collide at equal precision, so the id is the final tie-break.
pub fn compare_entries(a: &ReasoningLogEntry, b: &ReasoningLogEntry) -> Ordering {
    a.sequence
        .cmp(&b.sequence)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Return `entries` in canonical order.
pub fn sort_logs(entries: &[ReasoningLogEntry]) -> Vec<ReasoningLogEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(compare_entries);
    sorted
}

/// Insert `incoming`, replacing any entry with the same id, and sort.
pub fn merge_one(
    existing: &[ReasoningLogEntry],
    incoming: ReasoningLogEntry,
) -> Vec<ReasoningLogEntry> {
    let mut merged: Vec<ReasoningLogEntry> = existing
        .iter()
        .filter(|entry| entry.id != incoming.id)
        .cloned()
        .collect();
    merged.push(incoming);
    merged.sort_by(compare_entries);
    merged
}

/// Union of historical and live entries by id, live copies winning, sorted.
pub fn combine(
    historical: &[ReasoningLogEntry],
    live: &[ReasoningLogEntry],
) -> Vec<ReasoningLogEntry> {
    let mut by_id: HashMap<&str, &ReasoningLogEntry> =
        HashMap::with_capacity(historical.len() + live.len());
    for entry in historical.iter().chain(live) {
        by_id.insert(entry.id.as_str(), entry);
    }

    let mut combined: Vec<ReasoningLogEntry> = by_id.into_values().cloned().collect();
    combined.sort_by(compare_entries);
    combined
}
