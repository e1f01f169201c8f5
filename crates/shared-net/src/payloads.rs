//! # Wire Payloads
//!
//! One record per message type. Only field sets and meaning matter; the
//! byte layout is whatever `serde_json` produces.

use serde::{Deserialize, Serialize};
use shared_types::{
    AccountState, Address, Hash, NodeIndex, Request, SeqRange, ShardId, Timestamp, Transaction,
};
use std::collections::BTreeMap;

// =============================================================================
// CONSENSUS (intra-shard)
// =============================================================================

/// Primary's proposal for one sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepare {
    pub request: Request,
    pub digest: Hash,
    pub seq_id: u64,
}

/// A Prepare or Commit vote. Identified by the voter's replica index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub digest: Hash,
    pub seq_id: u64,
    pub sender: NodeIndex,
}

/// Ask the primary for the requests committed in `[seq_start, seq_end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOldMessage {
    pub range: SeqRange,
    pub server_node: NodeIndex,
    pub sender_node: NodeIndex,
}

/// Primary's answer to a [`RequestOldMessage`].
///
/// `old_requests` is truncated at the first height the primary cannot
/// serve, so it may be shorter than the requested range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOldMessage {
    pub range: SeqRange,
    pub old_requests: Vec<Request>,
    pub sender_node: NodeIndex,
}

// =============================================================================
// CROSS-SHARD EXECUTION
// =============================================================================

/// Transactions whose sender side already executed, forwarded to the
/// recipient's shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    pub txs: Vec<Transaction>,
    pub sender_shard: ShardId,
    pub sender_seq: u64,
}

/// Supervisor-injected transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectTxs {
    pub txs: Vec<Transaction>,
    pub to_shard: ShardId,
}

/// Commit summary sent by each shard primary to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockInfoMsg {
    pub block_body_length: usize,
    pub executed_txs: Vec<Transaction>,
    /// Migration round the block was committed in.
    pub epoch: u64,
    pub propose_time: Timestamp,
    pub commit_time: Timestamp,
    pub sender_shard: ShardId,
    pub relay1_txs: Vec<Transaction>,
    pub broker1_txs: Vec<Transaction>,
    pub broker2_txs: Vec<Transaction>,
}

impl BlockInfoMsg {
    pub fn relay1_tx_num(&self) -> usize {
        self.relay1_txs.len()
    }

    pub fn broker1_tx_num(&self) -> usize {
        self.broker1_txs.len()
    }

    pub fn broker2_tx_num(&self) -> usize {
        self.broker2_txs.len()
    }
}

/// Latest committed sequence of a remote shard (Broker variants).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqIdInfo {
    pub sender_shard: ShardId,
    pub sender_seq: u64,
}

// =============================================================================
// ACCOUNT MIGRATION
// =============================================================================

/// New owner for every account CLPA decided to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PartitionModifiedMap {
    pub partition_modified: BTreeMap<Address, ShardId>,
}

/// A shard primary announces it reached the migration barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionReady {
    pub from_shard: ShardId,
    pub now_seq_id: u64,
}

/// Accounts and pending transactions handed over to a new owner shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountStateAndTx {
    pub addrs: Vec<Address>,
    pub account_states: Vec<AccountState>,
    pub txs: Vec<Transaction>,
    pub from_shard: ShardId,
}

/// Payload of a `PartitionMigration` request, ordered through PBFT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountTransferMsg {
    pub modified_map: BTreeMap<Address, ShardId>,
    pub addrs: Vec<Address>,
    pub account_states: Vec<AccountState>,
    /// Transactions received with the accounts, re-injected on commit.
    pub txs: Vec<Transaction>,
    /// Number of modified maps known to the proposer (next round index).
    pub at_id: u64,
}
