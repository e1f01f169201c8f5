//! # Relay
//!
//! After a block commits, the primary forwards every transaction whose
//! recipient lives elsewhere to the recipient shard's primary, flagged as
//! relayed so the receiving side only credits.

use crate::context::NodeContext;
use crate::domain::ConsensusResult;
use emu_telemetry::RELAY_TXS_SENT;
use se_01_ledger::PartitionTable;
use shared_net::{Message, Relay};
use shared_types::{Block, ShardId, Transaction};
use tracing::debug;

/// Block body split by where each transaction finishes executing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RelaySplit {
    /// Recipient is local: fully executed here.
    pub executed: Vec<Transaction>,
    /// Recipient is remote: only the sender side ran here.
    pub relay1: Vec<Transaction>,
}

/// Classify `body` and buffer the cross-shard part in the pool's relay
/// buffer, keyed by destination shard.
pub fn split_block(
    body: &[Transaction],
    local: ShardId,
    partition: &PartitionTable,
    buffer: impl Fn(Transaction, ShardId),
) -> RelaySplit {
    let mut split = RelaySplit::default();
    for tx in body {
        let dest = partition.get(&tx.recipient);
        if dest == local {
            split.executed.push(tx.clone());
            continue;
        }
        let mut relayed = tx.clone();
        relayed.relayed = true;
        buffer(relayed, dest);
        split.relay1.push(tx.clone());
    }
    split
}

/// Send the buffered relay transactions, one message per other shard.
///
/// Shards with nothing to receive still get an empty message so their
/// remote-sequence tracker advances.
pub async fn send_relays(ctx: &NodeContext, block: &Block, seq: u64) -> ConsensusResult<RelaySplit> {
    let pool = ctx.ledger.tx_pool();
    let split = split_block(&block.body, ctx.shard_id, ctx.ledger.partition(), |tx, dest| {
        pool.add_relay_tx(tx, dest)
    });
    let mut by_shard = pool.take_relay_pool();
    let label = ctx.shard_label();

    for shard in (0..ctx.config.shard_num).filter(|s| *s != ctx.shard_id) {
        let txs = by_shard.remove(&shard).unwrap_or_default();
        let count = txs.len();
        let msg = Message::Relay(Relay {
            txs,
            sender_shard: ctx.shard_id,
            sender_seq: seq,
        });
        ctx.send_to(&msg, &ctx.config.nodes.primary(shard)).await?;
        RELAY_TXS_SENT
            .with_label_values(&[label.as_str()])
            .inc_by(count as f64);
        debug!(shard = ctx.shard_id, to_shard = shard, seq, txs = count, "[se-03] Relay sent");
    }
    Ok(split)
}
