//! # Replica State
//!
//! Everything a replica tracks per sequence number: the request held for
//! each height, vote counters and the once-only flags. Methods take the
//! decision; the service performs the resulting I/O after the lock is
//! released.
//!
//! ## Window
//!
//! A replica holds at most `retention` sequences ahead of the one it is
//! agreeing on, and keeps the last `retention` committed requests to serve
//! catch-up. Everything older is evicted on commit, so memory stays bounded
//! however long the run and whatever peers send.

use crate::domain::quorum::{commit_quorum, prepare_quorum, VoteCounter};
use shared_types::{Hash, NodeIndex, Request, SeqRange};
use std::collections::{BTreeMap, BTreeSet};

/// Where an incoming PrePrepare sits relative to the local sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Already committed here. Dropped.
    Stale,
    /// For the sequence being agreed on now. Validated and voted on.
    Current,
    /// For a later sequence inside the window. Stored without a vote.
    Ahead,
    /// Past the window. Dropped.
    Beyond,
}

/// What to do once Commit votes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitDecision {
    Wait,
    /// Quorum reached and the matching request is held locally.
    Apply(Request),
    /// Quorum reached for a sequence this replica cannot apply yet.
    CatchUp(SeqRange),
}

#[derive(Debug, Clone)]
struct Slot {
    digest: Hash,
    request: Request,
}

#[derive(Debug)]
pub struct PbftState {
    seq: u64,
    f: u64,
    retention: u64,
    slots: BTreeMap<u64, Slot>,
    prepares: VoteCounter,
    commits: VoteCounter,
    prepared: BTreeSet<u64>,
    commit_sent: BTreeSet<u64>,
    replied: BTreeSet<u64>,
    /// Digest a commit quorum agreed on, per sequence not yet applied.
    quorum_digests: BTreeMap<u64, Hash>,
    /// Last sequence of the catch-up range in flight.
    catch_up_to: Option<u64>,
}

impl PbftState {
    /// Fresh state expecting `first_seq` next. `retention` is clamped to
    /// at least one.
    pub fn new(f: u64, first_seq: u64, retention: u64) -> Self {
        Self {
            seq: first_seq,
            f,
            retention: retention.max(1),
            slots: BTreeMap::new(),
            prepares: VoteCounter::new(),
            commits: VoteCounter::new(),
            prepared: BTreeSet::new(),
            commit_sent: BTreeSet::new(),
            replied: BTreeSet::new(),
            quorum_digests: BTreeMap::new(),
            catch_up_to: None,
        }
    }

    /// Next sequence number to commit.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// First sequence past the window.
    fn window_end(&self) -> u64 {
        self.seq.saturating_add(self.retention)
    }

    fn in_window(&self, seq: u64) -> bool {
        seq >= self.seq && seq < self.window_end()
    }

    pub fn placement(&self, seq: u64) -> Placement {
        match seq.cmp(&self.seq) {
            std::cmp::Ordering::Less => Placement::Stale,
            std::cmp::Ordering::Equal => Placement::Current,
            std::cmp::Ordering::Greater if seq < self.window_end() => Placement::Ahead,
            std::cmp::Ordering::Greater => Placement::Beyond,
        }
    }

    /// Hold `request` as the proposal for `seq`.
    ///
    /// Returns `false`, leaving the held request untouched, if a different
    /// digest already occupies `seq`.
    pub fn store_request(&mut self, seq: u64, digest: Hash, request: Request) -> bool {
        match self.slots.get(&seq) {
            Some(slot) => slot.digest == digest,
            None => {
                self.slots.insert(seq, Slot { digest, request });
                true
            }
        }
    }

    pub fn digest_at(&self, seq: u64) -> Option<Hash> {
        self.slots.get(&seq).map(|slot| slot.digest)
    }

    fn holds(&self, seq: u64, digest: &Hash) -> bool {
        self.slots.get(&seq).is_some_and(|slot| slot.digest == *digest)
    }

    /// Request stored for the current sequence that this replica has not
    /// prepared yet.
    pub fn unprepared_current(&self) -> Option<(Hash, Request)> {
        if self.prepared.contains(&self.seq) || self.replied.contains(&self.seq) {
            return None;
        }
        self.slots
            .get(&self.seq)
            .map(|slot| (slot.digest, slot.request.clone()))
    }

    /// Record this replica's own Prepare. Returns `false` if `digest` is not
    /// the request held for `seq` or if it already prepared `seq`.
    pub fn mark_prepared(&mut self, digest: Hash, seq: u64, me: NodeIndex) -> bool {
        if !self.holds(seq, &digest) || !self.prepared.insert(seq) {
            return false;
        }
        self.prepares.record(seq, digest, me);
        true
    }

    /// Votes outside the window are dropped and count as zero.
    pub fn record_prepare(&mut self, seq: u64, digest: Hash, voter: NodeIndex) -> usize {
        if !self.in_window(seq) {
            return 0;
        }
        self.prepares.record(seq, digest, voter)
    }

    pub fn record_commit(&mut self, seq: u64, digest: Hash, voter: NodeIndex) -> usize {
        if !self.in_window(seq) {
            return 0;
        }
        self.commits.record(seq, digest, voter)
    }

    /// Whether this replica should broadcast Commit for `digest` now.
    ///
    /// On `true` the own Commit vote is already recorded.
    pub fn take_commit_turn(&mut self, digest: Hash, seq: u64, me: NodeIndex) -> bool {
        if seq != self.seq
            || !self.holds(seq, &digest)
            || self.commit_sent.contains(&seq)
            || self.prepares.count(seq, &digest) < prepare_quorum(self.f)
        {
            return false;
        }
        self.commit_sent.insert(seq);
        self.commits.record(seq, digest, me);
        true
    }

    pub fn decide_commit(&mut self, digest: Hash, seq: u64) -> CommitDecision {
        if seq < self.seq
            || self.replied.contains(&seq)
            || self.commits.count(seq, &digest) < commit_quorum(self.f)
        {
            return CommitDecision::Wait;
        }
        self.quorum_digests.insert(seq, digest);
        if seq == self.seq {
            if let Some(slot) = self.slots.get(&seq).filter(|slot| slot.digest == digest) {
                self.replied.insert(seq);
                return CommitDecision::Apply(slot.request.clone());
            }
        }
        if self.catch_up_to.is_some_and(|end| seq <= end) {
            return CommitDecision::Wait;
        }
        self.catch_up_to = Some(seq);
        CommitDecision::CatchUp(SeqRange::new(self.seq, seq))
    }

    /// Digest a commit quorum settled on for `seq`, if one was seen.
    pub fn quorum_digest(&self, seq: u64) -> Option<Hash> {
        self.quorum_digests.get(&seq).copied()
    }

    /// Advance past a committed sequence and evict what fell out of the
    /// window.
    pub fn finish_commit(&mut self, seq: u64) {
        self.seq = seq.saturating_add(1);
        let floor = self.seq.saturating_sub(self.retention);
        self.slots = self.slots.split_off(&floor);
        self.prepares.prune_below(self.seq);
        self.commits.prune_below(self.seq);
        self.prepared = self.prepared.split_off(&self.seq);
        self.commit_sent = self.commit_sent.split_off(&self.seq);
        self.replied = self.replied.split_off(&self.seq);
        self.quorum_digests = self.quorum_digests.split_off(&self.seq);
    }

    /// Requests for `range` in order, stopping at the first gap. The range
    /// is clamped to the heights actually held.
    pub fn requests_in(&self, range: SeqRange) -> Vec<Request> {
        let Some((&last, _)) = self.slots.last_key_value() else {
            return Vec::new();
        };
        let end = range.end.min(last);
        if range.start > end {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut expected = range.start;
        for (&height, slot) in self.slots.range(range.start..=end) {
            if height != expected {
                break;
            }
            out.push(slot.request.clone());
            expected = expected.saturating_add(1);
        }
        out
    }

    /// Install a request obtained through catch-up as committed, replacing
    /// whatever proposal was held for `seq`.
    pub fn record_caught_up(&mut self, seq: u64, digest: Hash, request: Request) {
        self.slots.insert(seq, Slot { digest, request });
        self.replied.insert(seq);
        self.finish_commit(seq);
    }

    pub fn is_awaiting_catch_up(&self) -> bool {
        self.catch_up_to.is_some()
    }

    pub fn end_catch_up(&mut self) {
        self.catch_up_to = None;
    }

    pub fn is_replied(&self, seq: u64) -> bool {
        self.replied.contains(&seq)
    }

    /// Number of requests held, committed or pending.
    pub fn pool_len(&self) -> usize {
        self.slots.len()
    }

    /// Sequences with Prepare or Commit votes on record.
    pub fn voted_seqs(&self) -> usize {
        self.prepares.len() + self.commits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::RequestKind;

    fn request(tag: u8) -> (Hash, Request) {
        let r = Request {
            kind: RequestKind::Block,
            payload: vec![tag],
            proposed_at: 0,
        };
        (r.digest().unwrap(), r)
    }

    #[test]
    fn test_placement() {
        let state = PbftState::new(1, 5, 3);
        assert_eq!(state.placement(4), Placement::Stale);
        assert_eq!(state.placement(5), Placement::Current);
        assert_eq!(state.placement(7), Placement::Ahead);
        assert_eq!(state.placement(8), Placement::Beyond);
        assert_eq!(state.placement(u64::MAX), Placement::Beyond);
    }

    #[test]
    fn test_four_replica_round() {
        // Backup 1 of a 4-replica shard at seq 5.
        let mut state = PbftState::new(1, 5, 100);
        let (d, r) = request(1);
        assert!(state.store_request(5, d, r.clone()));
        assert!(state.mark_prepared(d, 5, 1));
        assert!(!state.mark_prepared(d, 5, 1));
        assert!(!state.take_commit_turn(d, 5, 1));

        state.record_prepare(5, d, 2);
        assert!(state.take_commit_turn(d, 5, 1));
        assert!(!state.take_commit_turn(d, 5, 1));

        state.record_commit(5, d, 2);
        assert_eq!(state.decide_commit(d, 5), CommitDecision::Wait);
        state.record_commit(5, d, 0);
        assert_eq!(state.decide_commit(d, 5), CommitDecision::Apply(r));
        state.finish_commit(5);
        assert_eq!(state.seq(), 6);
        // A late fourth vote does nothing.
        assert_eq!(state.record_commit(5, d, 3), 0);
        assert_eq!(state.decide_commit(d, 5), CommitDecision::Wait);
    }

    #[test]
    fn test_conflicting_proposal_keeps_first_digest() {
        let mut state = PbftState::new(1, 1, 100);
        let (d1, r1) = request(1);
        let (d2, r2) = request(2);
        assert!(state.store_request(1, d1, r1.clone()));
        assert!(!state.store_request(1, d2, r2));
        assert!(state.store_request(1, d1, r1));
        assert_eq!(state.digest_at(1), Some(d1));

        // No Prepare and no Commit for the digest that lost the slot.
        assert!(!state.mark_prepared(d2, 1, 1));
        assert!(state.mark_prepared(d1, 1, 1));
        state.record_prepare(1, d2, 2);
        state.record_prepare(1, d2, 3);
        assert!(!state.take_commit_turn(d2, 1, 1));
    }

    #[test]
    fn test_quorum_for_other_digest_catches_up_instead_of_applying() {
        let mut state = PbftState::new(1, 1, 100);
        let (d1, r1) = request(1);
        let (d2, r2) = request(2);
        state.store_request(1, d1, r1);
        for voter in [0, 2, 3] {
            state.record_commit(1, d2, voter);
        }
        assert_eq!(
            state.decide_commit(d2, 1),
            CommitDecision::CatchUp(SeqRange::new(1, 1))
        );
        assert_eq!(state.quorum_digest(1), Some(d2));

        // The served request replaces the local proposal.
        state.record_caught_up(1, d2, r2.clone());
        assert_eq!(state.seq(), 2);
        assert_eq!(state.requests_in(SeqRange::new(1, 1)), vec![r2]);
    }

    #[test]
    fn test_missing_request_triggers_one_catch_up_per_range() {
        let mut state = PbftState::new(1, 3, 100);
        let (d, _) = request(9);
        for voter in [0, 1, 2] {
            state.record_commit(4, d, voter);
        }
        assert_eq!(
            state.decide_commit(d, 4),
            CommitDecision::CatchUp(SeqRange::new(3, 4))
        );
        assert!(state.is_awaiting_catch_up());
        assert_eq!(state.decide_commit(d, 4), CommitDecision::Wait);

        // The reply never came; a quorum further ahead asks again.
        let (d3, _) = request(11);
        for voter in [0, 1, 2] {
            state.record_commit(5, d3, voter);
        }
        assert_eq!(
            state.decide_commit(d3, 5),
            CommitDecision::CatchUp(SeqRange::new(3, 5))
        );
    }

    #[test]
    fn test_requests_in_stops_at_gap() {
        let mut state = PbftState::new(1, 1, 100);
        let (d1, r1) = request(1);
        let (d3, r3) = request(3);
        state.store_request(1, d1, r1.clone());
        state.store_request(3, d3, r3);
        assert_eq!(state.requests_in(SeqRange::new(1, 3)), vec![r1]);
        assert!(state.requests_in(SeqRange::new(2, 3)).is_empty());
    }

    #[test]
    fn test_requests_in_clamps_huge_range() {
        let mut state = PbftState::new(1, 1, 100);
        let (d1, r1) = request(1);
        let (d2, r2) = request(2);
        state.store_request(1, d1, r1.clone());
        state.store_request(2, d2, r2.clone());
        assert_eq!(
            state.requests_in(SeqRange::new(0, u64::MAX)),
            Vec::<Request>::new()
        );
        assert_eq!(
            state.requests_in(SeqRange::new(1, u64::MAX - 1)),
            vec![r1, r2]
        );
        assert!(state.requests_in(SeqRange::new(u64::MAX, u64::MAX)).is_empty());
        assert!(PbftState::new(1, 1, 100)
            .requests_in(SeqRange::new(0, u64::MAX))
            .is_empty());
    }

    #[test]
    fn test_caught_up_advances_and_exposes_next() {
        let mut state = PbftState::new(1, 1, 100);
        let (d1, r1) = request(1);
        let (d2, r2) = request(2);
        state.store_request(2, d2, r2.clone());
        state.record_caught_up(1, d1, r1);
        assert_eq!(state.seq(), 2);
        assert_eq!(state.unprepared_current(), Some((d2, r2)));
        state.mark_prepared(d2, 2, 1);
        assert_eq!(state.unprepared_current(), None);
    }

    #[test]
    fn test_commits_evict_beyond_retention() {
        let retention = 4;
        let mut state = PbftState::new(0, 1, retention);
        for seq in 1..=50u64 {
            let (d, r) = request(seq as u8);
            assert!(state.store_request(seq, d, r));
            state.record_commit(seq, d, 0);
            assert!(matches!(state.decide_commit(d, seq), CommitDecision::Apply(_)));
            state.finish_commit(seq);
            assert!(state.pool_len() <= retention as usize);
        }
        assert_eq!(state.seq(), 51);
        assert_eq!(state.requests_in(SeqRange::new(47, 50)).len(), 4);
        assert!(state.requests_in(SeqRange::new(46, 50)).is_empty());
    }

    #[test]
    fn test_votes_outside_window_are_dropped() {
        let mut state = PbftState::new(1, 10, 4);
        let d = [7u8; 32];
        for seq in [0, 9, 14, u64::MAX] {
            assert_eq!(state.record_prepare(seq, d, 2), 0);
            assert_eq!(state.record_commit(seq, d, 2), 0);
        }
        assert_eq!(state.voted_seqs(), 0);

        // Votes inside the window are pruned once their sequence commits.
        state.record_commit(11, d, 2);
        state.record_prepare(12, d, 3);
        assert_eq!(state.voted_seqs(), 2);
        state.finish_commit(12);
        assert_eq!(state.voted_seqs(), 0);
    }
}
