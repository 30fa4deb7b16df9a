//! Processed-sequence tracking for exactly-once request promotion
//!
//! Inbound topics are re-read on every poll, so the same envelope shows up again
//! and again. The [`ProcessedSequenceSet`] remembers which `(topic, sequence_number)`
//! pairs were already turned into connection requests.
//!
//! Memory is bounded per topic by an optional retention window. When the window
//! overflows, the lowest sequence numbers are dropped and folded into a per-topic
//! floor: everything at or below the floor is reported as processed. Topic sequence
//! numbers only grow, so this never lets an old envelope through twice.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::TopicId;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Statistics for deduplication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Sequence numbers checked
    pub checked: u64,
    /// Checks that hit an already-processed entry
    pub duplicates_detected: u64,
    /// Entries folded into a floor by the retention window
    pub pruned: u64,
}

// ----------------------------------------------------------------------------
// Per-topic Window
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TopicWindow {
    seen: BTreeSet<u64>,
    /// Highest sequence number dropped from `seen`
    floor: Option<u64>,
}

impl TopicWindow {
    fn contains(&self, sequence_number: u64) -> bool {
        self.floor.is_some_and(|floor| sequence_number <= floor)
            || self.seen.contains(&sequence_number)
    }

    /// Drop the oldest entries beyond `retention`, returning how many were dropped
    fn prune(&mut self, retention: usize) -> u64 {
        let mut dropped = 0;
        while self.seen.len() > retention {
            if let Some(oldest) = self.seen.pop_first() {
                self.floor = Some(self.floor.map_or(oldest, |floor| floor.max(oldest)));
                dropped += 1;
            }
        }
        dropped
    }
}

// ----------------------------------------------------------------------------
// Processed Sequence Set
// ----------------------------------------------------------------------------

/// Set of `(topic, sequence_number)` pairs already promoted into requests
///
/// Membership is monotonic: once `contains` reports a pair, it always will.
#[derive(Debug, Clone)]
pub struct ProcessedSequenceSet {
    topics: HashMap<TopicId, TopicWindow>,
    /// Maximum explicit entries kept per topic; `None` keeps everything
    retention_per_topic: Option<usize>,
    stats: DedupStats,
}

impl ProcessedSequenceSet {
    /// Create a set with the given per-topic retention window
    pub fn new(retention_per_topic: Option<usize>) -> Self {
        Self {
            topics: HashMap::new(),
            retention_per_topic: retention_per_topic.map(|r| r.max(1)),
            stats: DedupStats::default(),
        }
    }

    /// Create a set that never prunes
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Check whether a pair has been processed
    pub fn contains(&self, topic: &TopicId, sequence_number: u64) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|window| window.contains(sequence_number))
    }

    /// Check a pair and count the lookup in the statistics
    ///
    /// Returns true if this pair was already processed.
    pub fn check(&mut self, topic: &TopicId, sequence_number: u64) -> bool {
        self.stats.checked += 1;
        let duplicate = self.contains(topic, sequence_number);
        if duplicate {
            self.stats.duplicates_detected += 1;
        }
        duplicate
    }

    /// Record a pair as processed
    ///
    /// Returns true if the pair was not already processed.
    pub fn mark_processed(&mut self, topic: &TopicId, sequence_number: u64) -> bool {
        let window = self.topics.entry(topic.clone()).or_default();
        if window.contains(sequence_number) {
            return false;
        }
        window.seen.insert(sequence_number);

        if let Some(retention) = self.retention_per_topic {
            self.stats.pruned += window.prune(retention);
        }
        true
    }

    /// Highest sequence number folded into the floor for a topic
    pub fn floor(&self, topic: &TopicId) -> Option<u64> {
        self.topics.get(topic).and_then(|window| window.floor)
    }

    /// Number of explicitly retained entries across all topics
    pub fn len(&self) -> usize {
        self.topics.values().map(|window| window.seen.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topics
            .values()
            .all(|window| window.seen.is_empty() && window.floor.is_none())
    }

    pub fn retention_per_topic(&self) -> Option<usize> {
        self.retention_per_topic
    }

    /// Get deduplication statistics
    pub fn stats(&self) -> &DedupStats {
        &self.stats
    }
}

impl Default for ProcessedSequenceSet {
    fn default() -> Self {
        Self::unbounded()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
