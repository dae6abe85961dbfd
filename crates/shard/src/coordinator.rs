//! Coordinator role embedded in one participant shard per transaction
//!
//! The first shard a transaction touches is permanently its coordinator.
//! On a coordinate-commit hand-off it records the full participant list,
//! fans out prepare requests, and decides commit only once every recorded
//! participant has voted. No subset or quorum decision exists: every
//! shard's writes must durably survive, so every vote is required.

use std::collections::BTreeMap;

use chorus_common::{ShardId, Timestamp};

/// Vote-collection state for one coordinated transaction.
#[derive(Debug, Clone)]
pub struct CoordinatorRole {
    /// Full participant list, in join order, self included.
    participants: Vec<ShardId>,
    /// Still waiting for votes.
    collecting: bool,
    /// (participant, reported prepare timestamp) pairs received so far.
    votes: BTreeMap<ShardId, Timestamp>,
}

impl CoordinatorRole {
    pub fn new(participants: Vec<ShardId>) -> Self {
        Self {
            participants,
            collecting: true,
            votes: BTreeMap::new(),
        }
    }

    pub fn participants(&self) -> &[ShardId] {
        &self.participants
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Record a vote. Votes from shards outside the recorded participant
    /// set are dropped; duplicates overwrite (same participant, same
    /// prepare timestamp in practice).
    pub fn record_vote(&mut self, from: ShardId, prepare_ts: Timestamp) {
        if !self.collecting || !self.participants.contains(&from) {
            return;
        }
        self.votes.insert(from, prepare_ts);
    }

    /// Decide commit if and only if the set of voters equals exactly the
    /// recorded participant set. The commit timestamp is the maximum of
    /// all reported prepare timestamps, ordering the commit point after
    /// every participant's own prepare point.
    pub fn try_decide(&mut self) -> Option<Timestamp> {
        if !self.collecting || self.votes.len() != self.participants.len() {
            return None;
        }
        self.collecting = false;
        self.votes.values().copied().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_decision_on_subset() {
        let mut role = CoordinatorRole::new(vec![ShardId(1), ShardId(2)]);
        role.record_vote(ShardId(1), Timestamp(4));
        assert_eq!(role.try_decide(), None);
        assert!(role.is_collecting());
    }

    #[test]
    fn test_decides_with_max_prepare_timestamp() {
        let mut role = CoordinatorRole::new(vec![ShardId(1), ShardId(2)]);
        role.record_vote(ShardId(1), Timestamp(4));
        role.record_vote(ShardId(2), Timestamp(9));
        assert_eq!(role.try_decide(), Some(Timestamp(9)));
        assert!(!role.is_collecting());

        // A decision fires exactly once.
        assert_eq!(role.try_decide(), None);
    }

    #[test]
    fn test_foreign_votes_are_dropped() {
        let mut role = CoordinatorRole::new(vec![ShardId(1), ShardId(2)]);
        role.record_vote(ShardId(3), Timestamp(99));
        role.record_vote(ShardId(1), Timestamp(1));
        assert_eq!(role.try_decide(), None);
    }

    #[test]
    fn test_votes_after_decision_are_ignored() {
        let mut role = CoordinatorRole::new(vec![ShardId(1)]);
        role.record_vote(ShardId(1), Timestamp(2));
        assert_eq!(role.try_decide(), Some(Timestamp(2)));
        role.record_vote(ShardId(1), Timestamp(5));
        assert_eq!(role.try_decide(), None);
    }
}
