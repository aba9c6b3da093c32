use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::Message;

/// Category id -> record id -> number of messages unread by the viewer.
///
/// Record ids are only unique within a source, so entries are keyed by
/// the (record, category) pair that also picks the feedback source.
///
/// Derived data only. A record is present only when its count was computed
/// from an actual message set; a missing entry means "unknown", not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnreadIndex {
    counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl UnreadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_messages<'a>(messages: impl IntoIterator<Item = &'a Message>, viewer_id: &str) -> usize {
        messages
            .into_iter()
            .filter(|m| m.is_unread_for(viewer_id))
            .count()
    }

    pub fn set(&mut self, record_id: &str, category_id: &str, count: usize) {
        self.counts
            .entry(category_id.to_string())
            .or_default()
            .insert(record_id.to_string(), count);
    }

    pub fn get(&self, record_id: &str, category_id: &str) -> Option<usize> {
        self.counts.get(category_id)?.get(record_id).copied()
    }

    pub fn contains(&self, record_id: &str, category_id: &str) -> bool {
        self.get(record_id, category_id).is_some()
    }

    pub fn total(&self) -> usize {
        self.counts.values().flat_map(|records| records.values()).sum()
    }

    pub fn len(&self) -> usize {
        self.counts.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(record id, category id, count)`, ordered by category then record
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, usize)> {
        self.counts.iter().flat_map(|(category_id, records)| {
            records
                .iter()
                .map(move |(record_id, count)| (record_id.as_str(), category_id.as_str(), *count))
        })
    }

    /// Merge another index in; entries from `other` win
    pub fn extend(&mut self, other: UnreadIndex) {
        for (category_id, records) in other.counts {
            self.counts.entry(category_id).or_default().extend(records);
        }
    }
}
