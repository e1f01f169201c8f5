//! # Cross-Shard Strategy
//!
//! The deployment mode, chosen once when the replica is built. Every
//! variant answers the same hooks:
//!
//! | Hook | Called when |
//! |------|-------------|
//! | [`Strategy::propose`] | the primary needs the next request |
//! | [`Strategy::validate`] | a PrePrepare for the current sequence arrives |
//! | [`Strategy::commit`] | a request reaches the commit quorum |
//! | [`Strategy::apply_caught_up`] | a request is replayed through catch-up |
//! | [`Strategy::handle_outside`] | a message from outside the shard's PBFT arrives |

pub mod broker;
pub mod migration;
pub mod relay;

pub use broker::{classify, BrokerSplit};
pub use migration::MigrationCoordinator;
pub use relay::{split_block, RelaySplit};

use crate::context::NodeContext;
use crate::domain::{ConsensusError, ConsensusResult};
use emu_telemetry::{metric_inc, BLOCKS_COMMITTED, TXS_EXECUTED, TX_POOL_SIZE};
use shared_net::{AccountTransferMsg, BlockInfoMsg, Message, SeqIdInfo};
use shared_types::{
    decode, encode, now_millis, BarrierConfig, Block, Request, RequestKind, StrategyKind,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub enum Strategy {
    Relay,
    Broker,
    Clpa(MigrationCoordinator),
    ClpaBroker(MigrationCoordinator),
}

impl Strategy {
    pub fn new(kind: StrategyKind, barrier: &BarrierConfig) -> Self {
        match kind {
            StrategyKind::Relay => Self::Relay,
            StrategyKind::Broker => Self::Broker,
            StrategyKind::Clpa => Self::Clpa(MigrationCoordinator::new(barrier)),
            StrategyKind::ClpaBroker => Self::ClpaBroker(MigrationCoordinator::new(barrier)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Relay => StrategyKind::Relay,
            Self::Broker => StrategyKind::Broker,
            Self::Clpa(_) => StrategyKind::Clpa,
            Self::ClpaBroker(_) => StrategyKind::ClpaBroker,
        }
    }

    pub fn migration(&self) -> Option<&MigrationCoordinator> {
        match self {
            Self::Clpa(m) | Self::ClpaBroker(m) => Some(m),
            Self::Relay | Self::Broker => None,
        }
    }

    /// Migration round reported with each block.
    pub fn epoch(&self) -> u64 {
        self.migration().map_or(0, MigrationCoordinator::round)
    }

    /// Next request to order at `seq`.
    ///
    /// With a partition map pending this runs the migration barriers. If
    /// the other shards are not ready in time the round is put off and a
    /// block is proposed instead.
    pub async fn propose(
        &self,
        ctx: &NodeContext,
        seq: u64,
        stop: &watch::Receiver<bool>,
    ) -> ConsensusResult<Request> {
        if let Some(coordinator) = self.migration().filter(|m| m.is_partition_on()) {
            match coordinator.propose(ctx, seq, stop).await {
                Ok(request) => return Ok(request),
                Err(e @ ConsensusError::BarrierTimeout { .. }) => coordinator.postpone(ctx, &e),
                Err(e) => return Err(e),
            }
        }
        let block = ctx.ledger.generate_block(ctx.node_id)?;
        debug!(
            shard = ctx.shard_id,
            height = block.header.number,
            txs = block.body.len(),
            "[se-03] Block generated"
        );
        Ok(Request::new(RequestKind::Block, encode(&block)?))
    }

    /// Whether a proposal for the current sequence deserves a Prepare.
    pub fn validate(&self, ctx: &NodeContext, request: &Request) -> bool {
        match request.kind {
            RequestKind::Block => match decode::<Block>(&request.payload) {
                Ok(block) => match ctx.ledger.is_valid_block(&block) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(shard = ctx.shard_id, node = ctx.node_id, error = %e, "[se-03] Not a valid block");
                        false
                    }
                },
                Err(e) => {
                    warn!(shard = ctx.shard_id, node = ctx.node_id, error = %e, "[se-03] Undecodable block");
                    false
                }
            },
            RequestKind::PartitionMigration => {
                if self.migration().is_none() {
                    warn!(shard = ctx.shard_id, strategy = %self.kind(), "[se-03] Migration request in a mode without migration");
                    return false;
                }
                decode::<AccountTransferMsg>(&request.payload).is_ok()
            }
        }
    }

    /// Apply a committed request. On the primary, also emit the
    /// cross-shard messages and the block report.
    pub async fn commit(&self, ctx: &NodeContext, seq: u64, request: &Request) -> ConsensusResult<()> {
        let applied = self.apply(ctx, request)?;
        if !ctx.is_primary() {
            return Ok(());
        }
        let Some(block) = applied else {
            // Keep remote trackers in step across a migration commit.
            let seq_info = Message::SeqIdInfo(SeqIdInfo {
                sender_shard: ctx.shard_id,
                sender_seq: seq,
            });
            return ctx.send_to_other_primaries(&seq_info).await;
        };

        let label = ctx.shard_label();
        let mut info = BlockInfoMsg {
            block_body_length: block.body.len(),
            epoch: self.epoch(),
            propose_time: request.proposed_at,
            commit_time: now_millis(),
            sender_shard: ctx.shard_id,
            ..BlockInfoMsg::default()
        };
        match self {
            Self::Relay | Self::Clpa(_) => {
                let split = relay::send_relays(ctx, &block, seq).await?;
                info.executed_txs = split.executed;
                info.relay1_txs = split.relay1;
            }
            Self::Broker | Self::ClpaBroker(_) => {
                let split = classify(&block.body, ctx.shard_id, ctx.ledger.partition());
                let seq_info = Message::SeqIdInfo(SeqIdInfo {
                    sender_shard: ctx.shard_id,
                    sender_seq: seq,
                });
                ctx.send_to_other_primaries(&seq_info).await?;
                info.executed_txs = split.executed;
                info.broker1_txs = split.broker1;
                info.broker2_txs = split.broker2;
            }
        }
        TX_POOL_SIZE
            .with_label_values(&[label.as_str()])
            .set(ctx.ledger.tx_pool().len() as f64);
        info!(
            shard = ctx.shard_id,
            seq,
            executed = info.executed_txs.len(),
            relay1 = info.relay1_tx_num(),
            broker1 = info.broker1_tx_num(),
            broker2 = info.broker2_tx_num(),
            epoch = info.epoch,
            "[se-03] Block info sent"
        );
        ctx.send_to_collector(&Message::BlockInfo(Box::new(info))).await
    }

    /// Apply a request obtained through catch-up. No messages are sent.
    pub fn apply_caught_up(&self, ctx: &NodeContext, request: &Request) -> ConsensusResult<()> {
        self.apply(ctx, request).map(|_| ())
    }

    /// Write a committed request to the ledger. Returns the block if it
    /// was one.
    fn apply(&self, ctx: &NodeContext, request: &Request) -> ConsensusResult<Option<Block>> {
        let label = ctx.shard_label();
        match request.kind {
            RequestKind::Block => {
                let block: Block = decode(&request.payload)?;
                if ctx.ledger.add_block(&block)? {
                    TXS_EXECUTED
                        .with_label_values(&[label.as_str()])
                        .inc_by(block.body.len() as f64);
                }
                metric_inc!(BLOCKS_COMMITTED, &[label.as_str(), "block"]);
                info!(
                    shard = ctx.shard_id,
                    node = ctx.node_id,
                    height = block.header.number,
                    txs = block.body.len(),
                    "[se-03] Block added"
                );
                Ok(Some(block))
            }
            RequestKind::PartitionMigration => {
                let transfer: AccountTransferMsg = decode(&request.payload)?;
                match self.migration() {
                    Some(coordinator) => coordinator.apply(ctx, &transfer)?,
                    None => {
                        warn!(shard = ctx.shard_id, "[se-03] Committed migration ignored in a mode without migration");
                        return Ok(None);
                    }
                }
                metric_inc!(BLOCKS_COMMITTED, &[label.as_str(), "migration"]);
                Ok(None)
            }
        }
    }

    /// Messages that do not belong to the shard's own PBFT instance.
    pub fn handle_outside(&self, ctx: &NodeContext, msg: Message) {
        match msg {
            Message::Relay(relay) => {
                debug!(shard = ctx.shard_id, from_shard = relay.sender_shard, seq = relay.sender_seq, txs = relay.txs.len(), "[se-03] Relay received");
                ctx.ledger.tx_pool().add_txs(relay.txs);
                ctx.note_remote_seq(relay.sender_shard, relay.sender_seq);
            }
            Message::SeqIdInfo(info) => ctx.note_remote_seq(info.sender_shard, info.sender_seq),
            Message::Inject(inject) => {
                debug!(shard = ctx.shard_id, txs = inject.txs.len(), "[se-03] Transactions injected");
                ctx.ledger.tx_pool().add_txs(inject.txs);
            }
            Message::PartitionModifiedMap(map) => match self.migration() {
                Some(coordinator) => {
                    info!(shard = ctx.shard_id, accounts = map.partition_modified.len(), "[se-03] Partition map received");
                    coordinator.on_modified_map(map.partition_modified);
                }
                None => debug!(shard = ctx.shard_id, "[se-03] Partition map ignored"),
            },
            Message::PartitionReady(ready) => {
                if let Some(coordinator) = self.migration() {
                    debug!(shard = ctx.shard_id, from_shard = ready.from_shard, seq = ready.now_seq_id, "[se-03] Ready message");
                    coordinator.on_ready(&ready);
                }
            }
            Message::AccountStateAndTx(bundle) => {
                if let Some(coordinator) = self.migration() {
                    coordinator.on_account_state(bundle, ctx.config.shard_num);
                }
            }
            other => debug!(shard = ctx.shard_id, msg_type = %other.message_type(), "[se-03] Message not handled here"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use se_01_ledger::{InMemoryLedger, Ledger};
    use shared_net::{InMemoryNetwork, InjectTxs, PartitionModifiedMap, Relay};
    use shared_types::{EmulatorConfig, Transaction};
    use std::sync::Arc;

    fn context(node: u64, network: &InMemoryNetwork) -> (NodeContext, Arc<InMemoryLedger>) {
        let config = Arc::new(EmulatorConfig::for_testing());
        let ledger = Arc::new(InMemoryLedger::from_config(0, &config).unwrap());
        let ctx = NodeContext::new(config, 0, node, ledger.clone(), Arc::new(network.transport())).unwrap();
        (ctx, ledger)
    }

    fn tx(sender: &str, recipient: &str) -> Transaction {
        Transaction::new(sender.into(), recipient.into(), BigUint::from(3u32), 0)
    }

    #[test]
    fn test_construction_matches_kind() {
        let barrier = BarrierConfig::default();
        for kind in [StrategyKind::Relay, StrategyKind::Broker, StrategyKind::Clpa, StrategyKind::ClpaBroker] {
            let strategy = Strategy::new(kind, &barrier);
            assert_eq!(strategy.kind(), kind);
            assert_eq!(strategy.migration().is_some(), kind.uses_clpa());
            assert_eq!(strategy.epoch(), 0);
        }
    }

    #[tokio::test]
    async fn test_primary_relay_commit_emits_relay_and_block_info() {
        let network = InMemoryNetwork::new();
        let (ctx, ledger) = context(0, &network);
        let mut shard1 = network.register(&ctx.config.nodes.primary(1));
        let mut collector = network.register(ctx.config.nodes.supervisor());
        let (_stop_tx, stop) = watch::channel(false);
        let strategy = Strategy::new(StrategyKind::Relay, &ctx.config.barrier);

        ledger.tx_pool().add_txs(vec![tx("a0000000", "b0000002"), tx("a0000000", "b0000001")]);
        let request = strategy.propose(&ctx, 1, &stop).await.unwrap();
        assert!(strategy.validate(&ctx, &request));
        strategy.commit(&ctx, 1, &request).await.unwrap();
        assert_eq!(ledger.height(), 1);

        match shard1.recv().await.unwrap() {
            Message::Relay(Relay { txs, sender_shard, sender_seq }) => {
                assert_eq!(txs.len(), 1);
                assert!(txs[0].relayed);
                assert_eq!((sender_shard, sender_seq), (0, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
        match collector.recv().await.unwrap() {
            Message::BlockInfo(info) => {
                assert_eq!(info.block_body_length, 2);
                assert_eq!(info.executed_txs.len(), 1);
                assert_eq!(info.relay1_tx_num(), 1);
                assert_eq!(info.epoch, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backup_commit_sends_nothing() {
        let network = InMemoryNetwork::new();
        let (primary, _) = context(0, &network);
        let (backup, ledger) = context(1, &network);
        let mut collector = network.register(backup.config.nodes.supervisor());
        let (_stop_tx, stop) = watch::channel(false);
        let strategy = Strategy::new(StrategyKind::Broker, &backup.config.barrier);

        let request = strategy.propose(&primary, 1, &stop).await.unwrap();
        strategy.commit(&backup, 1, &request).await.unwrap();
        assert_eq!(ledger.height(), 1);
        assert!(collector.try_recv().is_err());
    }

    #[test]
    fn test_migration_request_rejected_without_clpa() {
        let network = InMemoryNetwork::new();
        let (ctx, _) = context(1, &network);
        let payload = encode(&AccountTransferMsg::default()).unwrap();
        let request = Request::new(RequestKind::PartitionMigration, payload);
        assert!(!Strategy::new(StrategyKind::Relay, &ctx.config.barrier).validate(&ctx, &request));
        assert!(Strategy::new(StrategyKind::Clpa, &ctx.config.barrier).validate(&ctx, &request));
    }

    #[test]
    fn test_outside_messages_feed_pool_and_trackers() {
        let network = InMemoryNetwork::new();
        let (ctx, ledger) = context(0, &network);
        let strategy = Strategy::new(StrategyKind::Clpa, &ctx.config.barrier);

        strategy.handle_outside(&ctx, Message::Inject(InjectTxs { txs: vec![tx("a0000000", "b0000000")], to_shard: 0 }));
        strategy.handle_outside(&ctx, Message::Relay(Relay { txs: vec![tx("a0000001", "b0000000")], sender_shard: 1, sender_seq: 4 }));
        strategy.handle_outside(&ctx, Message::SeqIdInfo(SeqIdInfo { sender_shard: 1, sender_seq: 5 }));
        assert_eq!(ledger.tx_pool().len(), 2);
        assert_eq!(ctx.remote_seqs().get(&1), Some(&5));

        strategy.handle_outside(&ctx, Message::PartitionModifiedMap(PartitionModifiedMap::default()));
        assert!(strategy.migration().unwrap().is_partition_on());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unready_migration_falls_back_to_block() {
        let network = InMemoryNetwork::new();
        let (ctx, _) = context(0, &network);
        let _shard1 = network.register(&ctx.config.nodes.primary(1));
        let (_stop_tx, stop) = watch::channel(false);
        let strategy = Strategy::new(StrategyKind::Clpa, &ctx.config.barrier);
        strategy.handle_outside(&ctx, Message::PartitionModifiedMap(PartitionModifiedMap::default()));

        let request = strategy.propose(&ctx, 1, &stop).await.unwrap();
        assert_eq!(request.kind, RequestKind::Block);
        assert!(strategy.migration().unwrap().is_partition_on());
        assert_eq!(strategy.epoch(), 0);
    }
}
