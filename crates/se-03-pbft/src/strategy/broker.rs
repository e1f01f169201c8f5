//! # Broker
//!
//! Cross-shard transfers arrive already split into two local hops by the
//! supervisor. At commit the primary only sorts the block body into hop
//! sets for the block report and checks that each hop ran where it should.

use se_01_ledger::PartitionTable;
use shared_types::{ShardId, Transaction};
use tracing::warn;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BrokerSplit {
    pub executed: Vec<Transaction>,
    /// Sender to broker.
    pub broker1: Vec<Transaction>,
    /// Broker to final recipient.
    pub broker2: Vec<Transaction>,
}

pub fn classify(body: &[Transaction], local: ShardId, partition: &PartitionTable) -> BrokerSplit {
    let mut split = BrokerSplit::default();
    for tx in body {
        let hop1 = tx.is_broker_hop1();
        let hop2 = tx.is_broker_hop2();
        let sender_local = partition.get(&tx.sender) == local;
        let recipient_local = partition.get(&tx.recipient) == local;

        let misplaced = (hop1 && !sender_local)
            || (hop2 && !recipient_local)
            || (tx.raw_tx_hash.is_none()
                && if tx.has_broker {
                    (tx.sender_is_broker && !recipient_local) || (!tx.sender_is_broker && !sender_local)
                } else {
                    !sender_local || !recipient_local
                });
        if misplaced {
            warn!(
                shard = local,
                sender = %tx.sender,
                recipient = %tx.recipient,
                hop1,
                hop2,
                "[se-03] Transaction executed outside its owning shard"
            );
        }

        if hop2 {
            split.broker2.push(tx.clone());
        } else if hop1 {
            split.broker1.push(tx.clone());
        } else {
            split.executed.push(tx.clone());
        }
    }
    split
}
