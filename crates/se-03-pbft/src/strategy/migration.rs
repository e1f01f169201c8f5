//! # Migration Coordinator
//!
//! Runs the account-migration protocol for the CLPA variants.
//!
//! ## Round, as seen by a shard primary
//!
//! ```text
//! PartitionModifiedMap ──→ partition on
//!        │
//!   propose: ready ──→ other primaries      [ready barrier]
//!        │
//!   drain owned accounts + their txs ──→ AccountState&txs per shard
//!        │                                  [collect barrier]
//!   PartitionMigration request ──→ PBFT ──→ commit on every replica
//! ```
//!
//! A ready barrier that times out postpones the round. Nothing has left the
//! shard yet, so the primary proposes a block and tries again at its next
//! proposal with the same map. Once the bundles are out the round can only
//! finish: the collect barrier keeps waiting until every bundle arrived or
//! the replica stops. Only the primary re-injects the migrated transactions.

use crate::context::NodeContext;
use crate::domain::{Barrier, ConsensusError, ConsensusResult, MigrationState, ModifiedMap};
use emu_telemetry::MIGRATION_ROUNDS;
use parking_lot::Mutex;
use shared_net::{AccountStateAndTx, AccountTransferMsg, Message, PartitionReady};
use shared_types::{encode, Address, BarrierConfig, Request, RequestKind, ShardId};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::watch;
use tracing::{info, warn};

pub struct MigrationCoordinator {
    state: Mutex<MigrationState>,
    ready_barrier: Barrier,
    collect_barrier: Barrier,
}

impl MigrationCoordinator {
    pub fn new(barrier: &BarrierConfig) -> Self {
        Self {
            state: Mutex::new(MigrationState::new()),
            ready_barrier: Barrier::new("partition-ready", barrier),
            collect_barrier: Barrier::new("collect-over", barrier),
        }
    }

    pub fn round(&self) -> u64 {
        self.state.lock().round()
    }

    pub fn is_partition_on(&self) -> bool {
        self.state.lock().is_partition_on()
    }

    pub fn on_modified_map(&self, map: ModifiedMap) {
        self.state.lock().push_modified_map(map);
    }

    pub fn on_ready(&self, ready: &PartitionReady) {
        self.state.lock().mark_ready(ready.from_shard, ready.now_seq_id);
    }

    pub fn on_account_state(&self, bundle: AccountStateAndTx, shard_num: u64) {
        let from = bundle.from_shard;
        let over = self.state.lock().collect(bundle, shard_num);
        info!(from_shard = from, collect_over = over, "[se-03] Account states received");
    }

    /// Drive both barriers and build the migration request.
    ///
    /// `now_seq` is the sequence number the request will be proposed at.
    /// Only the ready barrier can end in [`ConsensusError::BarrierTimeout`];
    /// the caller then calls [`Self::postpone`] and proposes a block.
    pub async fn propose(
        &self,
        ctx: &NodeContext,
        now_seq: u64,
        stop: &watch::Receiver<bool>,
    ) -> ConsensusResult<Request> {
        let shard_num = ctx.config.shard_num;
        self.state.lock().mark_ready(ctx.shard_id, now_seq);
        let ready = Message::PartitionReady(PartitionReady {
            from_shard: ctx.shard_id,
            now_seq_id: now_seq,
        });
        ctx.send_to_other_primaries(&ready).await?;
        info!(shard = ctx.shard_id, seq = now_seq, "[se-03] Ready for partition");

        self.ready_barrier
            .wait(|| self.state.lock().all_ready(shard_num, &ctx.remote_seqs()), stop)
            .await?;

        self.send_accounts_and_txs(ctx).await?;

        // The bundles are out, so the round can only complete or stop.
        loop {
            match self
                .collect_barrier
                .wait(|| self.state.lock().collect_over(shard_num), stop)
                .await
            {
                Ok(_) => break,
                Err(ConsensusError::BarrierTimeout { waited_ms, .. }) => {
                    let missing = {
                        let state = self.state.lock();
                        shard_num.saturating_sub(1).saturating_sub(state.collected_len())
                    };
                    warn!(
                        shard = ctx.shard_id,
                        round = self.round(),
                        waited_ms,
                        missing,
                        "[se-03] Still collecting account states"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let state = self.state.lock();
        let transfer = state
            .build_transfer()
            .ok_or(ConsensusError::NoPendingPartition { round: state.round() })?;
        drop(state);
        info!(
            shard = ctx.shard_id,
            addrs = transfer.addrs.len(),
            txs = transfer.txs.len(),
            at_id = transfer.at_id,
            "[se-03] Proposing partition migration"
        );
        Ok(Request::new(RequestKind::PartitionMigration, encode(&transfer)?))
    }

    /// Hand every account this shard gives up, with the pending
    /// transactions that touch it, to its new owner.
    async fn send_accounts_and_txs(&self, ctx: &NodeContext) -> ConsensusResult<()> {
        let map = {
            let state = self.state.lock();
            state
                .pending_map()
                .cloned()
                .ok_or(ConsensusError::NoPendingPartition { round: state.round() })?
        };
        let partition = ctx.ledger.partition();
        let mut outgoing: BTreeMap<ShardId, Vec<Address>> = BTreeMap::new();
        for (addr, new_shard) in &map {
            if *new_shard != ctx.shard_id && partition.get(addr) == ctx.shard_id {
                outgoing.entry(*new_shard).or_default().push(addr.clone());
            }
        }

        let pool = ctx.ledger.tx_pool();
        for shard in (0..ctx.config.shard_num).filter(|s| *s != ctx.shard_id) {
            let addrs = outgoing.remove(&shard).unwrap_or_default();
            let txs = {
                let moving: HashSet<&str> = addrs.iter().map(String::as_str).collect();
                pool.drain_matching(|tx| {
                    (moving.contains(tx.sender.as_str()) && !tx.relayed)
                        || (moving.contains(tx.recipient.as_str()) && tx.relayed)
                })
            };
            let account_states = ctx.ledger.fetch_accounts(&addrs);
            info!(
                shard = ctx.shard_id,
                to_shard = shard,
                addrs = addrs.len(),
                txs = txs.len(),
                "[se-03] Sending account states"
            );
            let msg = Message::AccountStateAndTx(AccountStateAndTx {
                addrs,
                account_states,
                txs,
                from_shard: ctx.shard_id,
            });
            ctx.send_to(&msg, &ctx.config.nodes.primary(shard)).await?;
        }
        Ok(())
    }

    /// Put the round off after the ready barrier timed out. The map stays
    /// pending and the next proposal starts over.
    pub fn postpone(&self, ctx: &NodeContext, cause: &ConsensusError) {
        MIGRATION_ROUNDS
            .with_label_values(&[ctx.shard_label().as_str(), "postponed"])
            .inc();
        warn!(
            shard = ctx.shard_id,
            round = self.round(),
            error = %cause,
            "[se-03] Migration round postponed"
        );
    }

    /// Apply a committed migration on this replica.
    pub fn apply(&self, ctx: &NodeContext, transfer: &AccountTransferMsg) -> ConsensusResult<()> {
        let moved = ctx.ledger.partition().apply(&transfer.modified_map);
        ctx.ledger
            .add_accounts(&transfer.addrs, &transfer.account_states)?;
        // Backups never pack blocks.
        if ctx.is_primary() {
            ctx.ledger.tx_pool().add_txs(transfer.txs.clone());
        }
        self.state.lock().complete_round(transfer);
        MIGRATION_ROUNDS
            .with_label_values(&[ctx.shard_label().as_str(), "committed"])
            .inc();
        info!(
            shard = ctx.shard_id,
            node = ctx.node_id,
            moved,
            accounts = transfer.addrs.len(),
            txs = transfer.txs.len(),
            round = transfer.at_id,
            "[se-03] Migration applied"
        );
        Ok(())
    }
}
