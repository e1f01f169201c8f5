//! Vote counting
//!
//! Votes are kept per sequence number. A replica holds one vote per
//! sequence: the first digest it voted for. Repeats and later votes for a
//! different digest are ignored, so no two digests of one sequence can
//! both reach a quorum of honest-majority size.

use shared_types::{Hash, NodeIndex};
use std::collections::{BTreeMap, HashMap};

/// Distinct Prepare voters needed before a replica sends Commit.
///
/// The primary never prepares its own proposal, so `2f` out of the
/// remaining `3f` replicas suffices.
pub fn prepare_quorum(f: u64) -> usize {
    (2 * f) as usize
}

/// Distinct Commit voters, self included, needed to commit.
pub fn commit_quorum(f: u64) -> usize {
    (2 * f + 1) as usize
}

#[derive(Debug, Default)]
pub struct VoteCounter {
    votes: BTreeMap<u64, HashMap<NodeIndex, Hash>>,
}

impl VoteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote and return the number of distinct voters for `digest`
    /// at `seq`.
    pub fn record(&mut self, seq: u64, digest: Hash, voter: NodeIndex) -> usize {
        self.votes.entry(seq).or_default().entry(voter).or_insert(digest);
        self.count(seq, &digest)
    }

    pub fn count(&self, seq: u64, digest: &Hash) -> usize {
        self.votes
            .get(&seq)
            .map_or(0, |voters| voters.values().filter(|d| *d == digest).count())
    }

    /// Forget every sequence below `seq`.
    pub fn prune_below(&mut self, seq: u64) {
        self.votes = self.votes.split_off(&seq);
    }

    /// Sequences with at least one vote.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}
