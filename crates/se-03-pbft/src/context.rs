//! # Node Context
//!
//! Identity, collaborators and addressing of one replica, shared by the
//! PBFT service and the strategy hooks.

use crate::domain::ConsensusResult;
use parking_lot::Mutex;
use se_01_ledger::Ledger;
use shared_net::{Message, Transport};
use shared_types::{EmulatorConfig, NodeIndex, ShardId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Index of the fixed primary in every shard.
pub const PRIMARY_INDEX: NodeIndex = 0;

pub struct NodeContext {
    pub config: Arc<EmulatorConfig>,
    pub shard_id: ShardId,
    pub node_id: NodeIndex,
    pub self_addr: String,
    /// Every replica of this shard, self included.
    pub peers: Vec<String>,
    pub ledger: Arc<dyn Ledger>,
    pub transport: Arc<dyn Transport>,
    /// Last sequence number absorbed from each remote shard.
    remote_seqs: Mutex<HashMap<ShardId, u64>>,
}

impl NodeContext {
    pub fn new(
        config: Arc<EmulatorConfig>,
        shard_id: ShardId,
        node_id: NodeIndex,
        ledger: Arc<dyn Ledger>,
        transport: Arc<dyn Transport>,
    ) -> ConsensusResult<Self> {
        config.check_node(shard_id, node_id)?;
        Ok(Self {
            self_addr: config.nodes.addr(shard_id, node_id),
            peers: config.shard_addrs(shard_id),
            config,
            shard_id,
            node_id,
            ledger,
            transport,
            remote_seqs: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_primary(&self) -> bool {
        self.node_id == PRIMARY_INDEX
    }

    pub fn f(&self) -> u64 {
        self.config.fault_tolerance()
    }

    /// Label value for per-shard metrics.
    pub fn shard_label(&self) -> String {
        self.shard_id.to_string()
    }

    pub fn note_remote_seq(&self, shard: ShardId, seq: u64) {
        self.remote_seqs.lock().insert(shard, seq);
    }

    pub fn remote_seqs(&self) -> HashMap<ShardId, u64> {
        self.remote_seqs.lock().clone()
    }

    /// Send one message. Encoding errors are returned, delivery errors are
    /// only logged.
    pub async fn send_to(&self, msg: &Message, addr: &str) -> ConsensusResult<()> {
        let frame = msg.to_frame()?;
        if let Err(e) = self.transport.send_frame(&frame, addr).await {
            warn!(
                shard = self.shard_id,
                node = self.node_id,
                to = %addr,
                msg_type = %msg.message_type(),
                error = %e,
                "[se-03] Send failed"
            );
        }
        Ok(())
    }

    /// Send to every other replica of this shard.
    pub async fn broadcast(&self, msg: &Message) -> ConsensusResult<()> {
        self.transport
            .broadcast(msg, &self.self_addr, &self.peers)
            .await?;
        Ok(())
    }

    pub async fn send_to_primary(&self, msg: &Message) -> ConsensusResult<()> {
        let primary = self.config.nodes.primary(self.shard_id);
        self.send_to(msg, &primary).await
    }

    /// Send to the primary of every shard except this one.
    pub async fn send_to_other_primaries(&self, msg: &Message) -> ConsensusResult<()> {
        for shard in (0..self.config.shard_num).filter(|s| *s != self.shard_id) {
            let primary = self.config.nodes.primary(shard);
            self.send_to(msg, &primary).await?;
        }
        Ok(())
    }

    pub async fn send_to_collector(&self, msg: &Message) -> ConsensusResult<()> {
        let collector = self.config.nodes.supervisor().to_string();
        self.send_to(msg, &collector).await
    }
}
