//! [`OffsetManager`]: tracks per-partition consume progress and commits it to the
//! group coordinator on a threshold/interval/explicit basis.
//!
//! A thin stateful wrapper around [`ConsumerGroup::offsets`] /
//! [`ConsumerGroup::commit`] -- this module owns no broker connection of its own.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::client::consumer_group::ConsumerGroup;
use crate::client::error::Result;
use crate::protocol::messages::offset_commit::{PartitionCommit, TopicCommit};

/// Configuration for [`OffsetManager`], matching the consumer configuration surface's
/// `offset_commit_interval`/`offset_commit_threshold` fields.
#[derive(Debug, Clone)]
pub struct OffsetManagerConfig {
    /// Commit once `uncommitted_count` reaches this many records, for any tracked
    /// partition. `0` disables threshold-triggered commits.
    pub commit_threshold: u64,
    /// Commit at least this often regardless of `commit_threshold`.
    pub commit_interval: Duration,
}

impl Default for OffsetManagerConfig {
    fn default() -> Self {
        Self {
            commit_threshold: 0,
            commit_interval: Duration::from_secs(5),
        }
    }
}

/// Per-`(topic, partition)` progress: `committed_offset <= processed_offset`, and
/// `uncommitted_count = processed_offset - committed_offset` (until the next reset by a
/// successful commit).
#[derive(Debug, Clone, Copy, Default)]
struct OffsetState {
    processed_offset: i64,
    committed_offset: i64,
    uncommitted_count: u64,
}

/// Tracks processed offsets per `(topic, partition)` for a [`ConsumerGroup`] and commits
/// them on a threshold/interval/explicit basis.
#[derive(Debug)]
pub struct OffsetManager {
    config: OffsetManagerConfig,
    offsets: BTreeMap<(String, i32), OffsetState>,
    last_commit: Instant,
}

impl OffsetManager {
    pub fn new(config: OffsetManagerConfig) -> Self {
        Self {
            config,
            offsets: BTreeMap::new(),
            last_commit: Instant::now(),
        }
    }

    /// Records that `offset` was processed for `(topic, partition)`; the offset a
    /// restart should resume from is `offset + 1`.
    pub fn mark_as_processed(&mut self, topic: &str, partition: i32, offset: i64) {
        let state = self
            .offsets
            .entry((topic.to_string(), partition))
            .or_default();

        state.processed_offset = offset + 1;
        state.uncommitted_count = (state.processed_offset - state.committed_offset).max(0) as u64;
    }

    /// Commits offsets for every `(topic, partition)` with `uncommitted_count > 0`.
    pub async fn commit_offsets(&mut self, group: &ConsumerGroup) -> Result<()> {
        let mut by_topic: BTreeMap<String, Vec<PartitionCommit>> = BTreeMap::new();
        for ((topic, partition), state) in &self.offsets {
            if state.uncommitted_count == 0 {
                continue;
            }
            by_topic.entry(topic.clone()).or_default().push(PartitionCommit {
                partition_index: *partition,
                committed_offset: state.processed_offset,
                committed_metadata: None,
            });
        }

        if by_topic.is_empty() {
            return Ok(());
        }

        let topics: Vec<TopicCommit> = by_topic
            .into_iter()
            .map(|(name, partitions)| TopicCommit { name, partitions })
            .collect();

        group.commit(topics).await?;

        for state in self.offsets.values_mut() {
            if state.uncommitted_count > 0 {
                state.committed_offset = state.processed_offset;
                state.uncommitted_count = 0;
            }
        }
        self.last_commit = Instant::now();

        debug!("committed offsets");
        Ok(())
    }

    /// Commits if `uncommitted_count` has reached `commit_threshold` for any tracked
    /// partition, or if `commit_interval` has elapsed since the last commit.
    pub async fn commit_offsets_if_necessary(&mut self, group: &ConsumerGroup) -> Result<()> {
        let threshold_hit = self.config.commit_threshold > 0
            && self
                .offsets
                .values()
                .any(|s| s.uncommitted_count >= self.config.commit_threshold);
        let interval_elapsed = self.last_commit.elapsed() >= self.config.commit_interval;

        if threshold_hit || interval_elapsed {
            self.commit_offsets(group).await?;
        }
        Ok(())
    }

    /// Fetches this group's last committed offset for `(topic, partition)` from the
    /// coordinator, returning `-1` if none exists (callers apply their own
    /// start-from-beginning/end policy in that case), and seeds the local committed/
    /// processed state from it.
    pub async fn next_offset_for(&mut self, group: &ConsumerGroup, topic: &str, partition: i32) -> Result<i64> {
        let topics = group.offsets().await?;

        let committed = topics
            .iter()
            .find(|t| t.name == topic)
            .and_then(|t| t.partitions.iter().find(|p| p.partition_index == partition))
            .map(|p| p.committed_offset)
            .unwrap_or(-1);

        let state = self
            .offsets
            .entry((topic.to_string(), partition))
            .or_default();
        state.committed_offset = committed.max(-1);
        if committed >= 0 {
            state.processed_offset = state.processed_offset.max(committed);
        }

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_as_processed_tracks_uncommitted_count() {
        let mut mgr = OffsetManager::new(OffsetManagerConfig::default());
        mgr.mark_as_processed("t", 0, 99);

        let state = mgr.offsets[&("t".to_string(), 0)];
        assert_eq!(state.processed_offset, 100);
        assert_eq!(state.uncommitted_count, 100);
        assert_eq!(state.committed_offset, 0);
    }

    #[test]
    fn mark_as_processed_is_monotonic_per_call() {
        let mut mgr = OffsetManager::new(OffsetManagerConfig::default());
        mgr.mark_as_processed("t", 0, 10);
        mgr.mark_as_processed("t", 0, 20);

        let state = mgr.offsets[&("t".to_string(), 0)];
        assert_eq!(state.processed_offset, 21);
        assert_eq!(state.uncommitted_count, 21);
    }
}
