//! # Committee
//!
//! Decides where injected transactions go and when accounts move.
//!
//! | Strategy | Routing | Cross-shard transfer | Repartition |
//! |----------|---------|----------------------|-------------|
//! | `Relay` | default shard | injected as is | no |
//! | `Broker` | default shard | split into two hops | no |
//! | `CLPA` | CLPA labels | injected as is | yes |
//! | `CLPA_Broker` | CLPA labels | split into two hops | yes |
//!
//! Every transfer is injected into its sender's shard. A repartition is
//! confirmed once every shard reports a block from the new epoch.

use crate::domain::broker::BrokerBook;
use crate::domain::errors::{SupervisorError, SupervisorResult};
use se_02_partition::ClpaState;
use shared_net::BlockInfoMsg;
use shared_types::{default_shard, Address, EmulatorConfig, ShardId, StrategyKind, Transaction};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Transactions to inject, grouped by destination shard.
pub type Injection = BTreeMap<ShardId, Vec<Transaction>>;

#[derive(Debug)]
pub struct Committee {
    kind: StrategyKind,
    shard_num: u64,
    clpa: Option<ClpaState>,
    brokers: Option<BrokerBook>,
    /// Highest epoch reported by each shard.
    shard_epochs: Vec<u64>,
    /// Modified maps sent to the shards so far.
    maps_sent: u64,
}

impl Committee {
    pub fn new(config: &EmulatorConfig) -> SupervisorResult<Self> {
        let kind = config.strategy;
        let clpa = if kind.uses_clpa() {
            Some(ClpaState::new(&config.clpa, config.shard_num)?)
        } else {
            None
        };
        let brokers = if kind.uses_broker() {
            let addrs = config.broker_addresses();
            if addrs.is_empty() {
                return Err(SupervisorError::NoBrokers);
            }
            Some(BrokerBook::new(addrs))
        } else {
            None
        };
        Ok(Self {
            kind,
            shard_num: config.shard_num,
            clpa,
            brokers,
            shard_epochs: vec![0; config.shard_num as usize],
            maps_sent: 0,
        })
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Shard the supervisor currently routes `addr` to.
    pub fn shard_of(&self, addr: &str) -> ShardId {
        match &self.clpa {
            Some(clpa) => clpa.shard_of(addr),
            None => default_shard(addr, self.shard_num),
        }
    }

    /// Group a slice of the dataset by the shard each transfer starts in.
    pub fn route(&mut self, txs: Vec<Transaction>) -> Injection {
        let mut out = Injection::new();
        for tx in txs {
            if let Some(clpa) = self.clpa.as_mut() {
                clpa.add_edge(&tx.sender, &tx.recipient);
            }
            let sender_shard = self.shard_of(&tx.sender);
            let cross_shard = sender_shard != self.shard_of(&tx.recipient);
            let tx = match self.brokers.as_mut() {
                Some(book)
                    if cross_shard && !book.is_broker(&tx.sender) && !book.is_broker(&tx.recipient) =>
                {
                    book.first_hop(tx)
                }
                _ => tx,
            };
            out.entry(sender_shard).or_default().push(tx);
        }
        out
    }

    /// Absorb one block report. Returns the second hops it releases.
    pub fn on_block_info(&mut self, info: &BlockInfoMsg) -> Injection {
        if let Some(epoch) = self.shard_epochs.get_mut(info.sender_shard as usize) {
            *epoch = (*epoch).max(info.epoch);
        }
        let Some(book) = self.brokers.as_mut() else {
            return Injection::new();
        };
        let second_hops: Vec<Transaction> = info
            .broker1_txs
            .iter()
            .filter_map(|hop1| book.confirm(hop1))
            .collect();
        if !second_hops.is_empty() {
            debug!(
                shard = info.sender_shard,
                count = second_hops.len(),
                "[se-04] Broker first hops confirmed"
            );
        }

        let mut out = Injection::new();
        for hop in second_hops {
            out.entry(self.shard_of(&hop.recipient)).or_default().push(hop);
        }
        out
    }

    /// Lowest epoch reported across all shards.
    pub fn confirmed_epoch(&self) -> u64 {
        self.shard_epochs.iter().copied().min().unwrap_or(0)
    }

    /// Whether a sent modified map has not been committed everywhere yet.
    pub fn migration_pending(&self) -> bool {
        self.maps_sent > self.confirmed_epoch()
    }

    pub fn maps_sent(&self) -> u64 {
        self.maps_sent
    }

    /// Give up on an unconfirmed repartition and realign the round count
    /// with what the shards report.
    pub fn abandon_migration(&mut self) {
        self.maps_sent = self.confirmed_epoch();
    }

    /// Run CLPA over the edges gathered since the last run.
    ///
    /// Returns the accounts that change shard, or `None` when this
    /// committee does not repartition or nothing moved. Edges are erased
    /// either way.
    pub fn repartition(&mut self) -> Option<BTreeMap<Address, ShardId>> {
        if self.shard_num < 2 {
            return None;
        }
        let clpa = self.clpa.as_mut()?;
        if clpa.graph().edge_count() == 0 {
            return None;
        }
        let outcome = clpa.partition();
        clpa.erase_edges();
        if outcome.modified.is_empty() {
            return None;
        }
        self.maps_sent += 1;
        info!(
            round = self.maps_sent,
            moved = outcome.modified.len(),
            cross_shard_edges = outcome.cross_shard_edges,
            "[se-04] Repartition computed"
        );
        Some(outcome.modified)
    }
}
