//! # Partition Table
//!
//! This replica's account-to-shard map. Accounts never migrated resolve to
//! their default shard.

use parking_lot::RwLock;
use shared_types::{default_shard, Address, ShardId};
use std::collections::HashMap;

#[derive(Debug)]
pub struct PartitionTable {
    shard_num: u64,
    map: RwLock<HashMap<Address, ShardId>>,
}

impl PartitionTable {
    pub fn new(shard_num: u64) -> Self {
        Self {
            shard_num,
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, addr: &str) -> ShardId {
        self.map
            .read()
            .get(addr)
            .copied()
            .unwrap_or_else(|| default_shard(addr, self.shard_num))
    }

    pub fn set(&self, addr: Address, shard: ShardId) {
        self.map.write().insert(addr, shard);
    }

    /// Apply a batch of reassignments under one lock.
    pub fn apply<'a, I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = (&'a Address, &'a ShardId)>,
    {
        let mut map = self.map.write();
        let mut n = 0;
        for (addr, shard) in updates {
            map.insert(addr.clone(), *shard);
            n += 1;
        }
        n
    }

    /// Number of explicitly assigned accounts.
    pub fn explicit_len(&self) -> usize {
        self.map.read().len()
    }

    pub fn shard_num(&self) -> u64 {
        self.shard_num
    }
}
