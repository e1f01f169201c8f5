//! # Migration Round Record
//!
//! Scratch state of the account-migration protocol on one replica: the
//! partition maps received so far, the current round, and the two barrier
//! inputs (ready flags with the sequence each shard was at, and the
//! account/transaction bundles collected from the other shards).

use shared_net::{AccountStateAndTx, AccountTransferMsg};
use shared_types::{AccountState, Address, ShardId, Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type ModifiedMap = BTreeMap<Address, ShardId>;

#[derive(Debug, Default)]
pub struct MigrationState {
    modified_maps: Vec<ModifiedMap>,
    round: u64,
    partition_on: bool,
    ready: BTreeSet<ShardId>,
    ready_seq: HashMap<ShardId, u64>,
    collected: BTreeMap<ShardId, AccountStateAndTx>,
}

impl MigrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a map received from the partition committee.
    pub fn push_modified_map(&mut self, map: ModifiedMap) {
        self.modified_maps.push(map);
        self.partition_on = true;
    }

    pub fn is_partition_on(&self) -> bool {
        self.partition_on
    }

    /// Migration rounds completed so far. Reported as the block epoch.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Map the current round migrates to.
    pub fn pending_map(&self) -> Option<&ModifiedMap> {
        self.modified_maps.get(self.round as usize)
    }

    pub fn mark_ready(&mut self, shard: ShardId, now_seq: u64) {
        self.ready.insert(shard);
        self.ready_seq.insert(shard, now_seq);
    }

    /// The ready barrier: every shard announced readiness, and for each
    /// shard this replica has heard sequence numbers from, the last one it
    /// absorbed is the one right before that shard's ready point.
    pub fn all_ready(&self, shard_num: u64, remote_seqs: &HashMap<ShardId, u64>) -> bool {
        if self.ready.len() as u64 != shard_num {
            return false;
        }
        remote_seqs.iter().all(|(shard, absorbed)| {
            self.ready_seq
                .get(shard)
                .is_some_and(|now| now.saturating_sub(1) == *absorbed)
        })
    }

    /// Store a bundle. Returns `true` once every other shard reported.
    pub fn collect(&mut self, bundle: AccountStateAndTx, shard_num: u64) -> bool {
        self.collected.insert(bundle.from_shard, bundle);
        self.collect_over(shard_num)
    }

    pub fn collect_over(&self, shard_num: u64) -> bool {
        self.collected.len() as u64 >= shard_num.saturating_sub(1)
    }

    /// Merge the collected bundles into the record proposed to consensus.
    pub fn build_transfer(&self) -> Option<AccountTransferMsg> {
        let map = self.pending_map()?.clone();
        let mut states: BTreeMap<Address, AccountState> = BTreeMap::new();
        let mut txs: Vec<Transaction> = Vec::new();
        for bundle in self.collected.values() {
            for (addr, state) in bundle.addrs.iter().zip(&bundle.account_states) {
                states.insert(addr.clone(), state.clone());
            }
            txs.extend(bundle.txs.iter().cloned());
        }
        let (addrs, account_states) = states.into_iter().unzip();
        Some(AccountTransferMsg {
            modified_map: map,
            addrs,
            account_states,
            txs,
            at_id: self.modified_maps.len() as u64,
        })
    }

    /// Close a committed round and clear the scratch state.
    pub fn complete_round(&mut self, transfer: &AccountTransferMsg) {
        if self.modified_maps.len() as u64 != transfer.at_id {
            self.modified_maps.push(transfer.modified_map.clone());
        }
        self.round = transfer.at_id;
        self.reset_scratch();
    }

    /// Bundles stored for the round in progress.
    pub fn collected_len(&self) -> u64 {
        self.collected.len() as u64
    }

    fn reset_scratch(&mut self) {
        self.partition_on = false;
        self.ready.clear();
        self.ready_seq.clear();
        self.collected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn map(pairs: &[(&str, ShardId)]) -> ModifiedMap {
        pairs.iter().map(|(a, s)| (a.to_string(), *s)).collect()
    }

    fn bundle(from: ShardId, addr: &str, balance: u32) -> AccountStateAndTx {
        AccountStateAndTx {
            addrs: vec![addr.to_string()],
            account_states: vec![AccountState::with_balance(BigUint::from(balance))],
            txs: vec![Transaction::new(addr.into(), "r".into(), BigUint::from(1u32), 0)],
            from_shard: from,
        }
    }

    #[test]
    fn test_ready_barrier_needs_all_shards_and_absorbed_seqs() {
        let mut state = MigrationState::new();
        let mut remote = HashMap::new();
        state.mark_ready(0, 7);
        assert!(!state.all_ready(2, &remote));

        state.mark_ready(1, 5);
        remote.insert(1, 3);
        assert!(!state.all_ready(2, &remote));
        remote.insert(1, 4);
        assert!(state.all_ready(2, &remote));

        // A shard we heard from but that never announced readiness blocks.
        remote.insert(2, 1);
        assert!(!state.all_ready(2, &remote));
    }

    #[test]
    fn test_collect_and_build_transfer() {
        let mut state = MigrationState::new();
        state.push_modified_map(map(&[("a", 0), ("b", 0)]));
        assert!(!state.collect(bundle(1, "a", 10), 3));
        assert!(state.collect(bundle(2, "b", 20), 3));

        let transfer = state.build_transfer().unwrap();
        assert_eq!(transfer.addrs, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(transfer.account_states[1].balance, BigUint::from(20u32));
        assert_eq!(transfer.txs.len(), 2);
        assert_eq!(transfer.at_id, 1);
    }

    #[test]
    fn test_complete_round_on_primary_and_backup() {
        let mut primary = MigrationState::new();
        primary.push_modified_map(map(&[("a", 1)]));
        primary.mark_ready(0, 3);
        let transfer = primary.build_transfer().unwrap();
        primary.complete_round(&transfer);
        assert_eq!(primary.round(), 1);
        assert!(!primary.is_partition_on());
        assert!(primary.pending_map().is_none());

        // A backup never saw the map message and learns it from the commit.
        let mut backup = MigrationState::new();
        backup.complete_round(&transfer);
        assert_eq!(backup.round(), 1);

        primary.push_modified_map(map(&[("b", 0)]));
        assert_eq!(primary.pending_map(), Some(&map(&[("b", 0)])));
        assert_eq!(primary.build_transfer().unwrap().at_id, 2);
    }

    #[test]
    fn test_ready_refresh_keeps_pending_round() {
        let mut state = MigrationState::new();
        state.push_modified_map(map(&[("a", 1)]));
        state.mark_ready(0, 1);
        assert!(!state.all_ready(2, &HashMap::new()));

        // A postponed primary announces again at a later sequence.
        state.mark_ready(0, 4);
        state.mark_ready(1, 2);
        let mut remote = HashMap::new();
        remote.insert(1, 1);
        assert!(state.all_ready(2, &remote));
        assert!(state.is_partition_on());
        assert_eq!(state.pending_map(), Some(&map(&[("a", 1)])));
        assert_eq!(state.collected_len(), 0);
    }
}
