//! # Transaction Execution
//!
//! Application rules for one block body against an account map:
//!
//! - the sender is debited only when the tx was not relayed and the sender
//!   is local (or the tx is a broker hop);
//! - insufficient balance skips the transaction entirely;
//! - the recipient is credited when local (or the tx is a broker hop);
//! - an account seen for the first time starts at the initial balance.

use crate::domain::partition_table::PartitionTable;
use num_bigint::BigUint;
use shared_types::{digest, encode, AccountState, Address, CodecResult, Hash, ShardId, Transaction};
use std::collections::BTreeMap;

/// What the rules need to know about the executing shard.
pub struct ExecutionContext<'a> {
    pub shard_id: ShardId,
    pub partition: &'a PartitionTable,
    pub init_balance: &'a BigUint,
}

/// Outcome counters of one application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub debited: usize,
    pub credited: usize,
    pub skipped: usize,
}

impl ExecutionStats {
    pub fn touched(&self) -> usize {
        self.debited + self.credited
    }
}

/// Apply `txs` in order to `accounts`.
pub fn apply_transactions(
    accounts: &mut BTreeMap<Address, AccountState>,
    txs: &[Transaction],
    ctx: &ExecutionContext<'_>,
) -> ExecutionStats {
    let mut stats = ExecutionStats::default();
    for tx in txs {
        let sender_local = ctx.partition.get(&tx.sender) == ctx.shard_id;
        if !tx.relayed && (sender_local || tx.has_broker) {
            let sender = accounts
                .entry(tx.sender.clone())
                .or_insert_with(|| AccountState::with_balance(ctx.init_balance.clone()));
            if !sender.deduct(&tx.value) {
                stats.skipped += 1;
                continue;
            }
            stats.debited += 1;
        }
        let recipient_local = ctx.partition.get(&tx.recipient) == ctx.shard_id;
        if recipient_local || tx.has_broker {
            accounts
                .entry(tx.recipient.clone())
                .or_insert_with(|| AccountState::with_balance(ctx.init_balance.clone()))
                .deposit(&tx.value);
            stats.credited += 1;
        }
    }
    stats
}

/// Root over the ordered account map.
pub fn state_root(accounts: &BTreeMap<Address, AccountState>) -> CodecResult<Hash> {
    Ok(digest(&encode(accounts)?))
}

/// Root over the ordered list of transaction hashes.
pub fn tx_root(txs: &[Transaction]) -> CodecResult<Hash> {
    let hashes: Vec<Hash> = txs.iter().map(|tx| tx.tx_hash).collect();
    Ok(digest(&encode(&hashes)?))
}
