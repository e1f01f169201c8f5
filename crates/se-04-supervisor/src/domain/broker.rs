//! # Broker Book
//!
//! Splits a cross-shard transfer into two local hops through a broker
//! account and remembers the raw transfer until its first hop commits.
//!
//! ```text
//! raw: A ──v──→ B
//! hop 1 (A's shard):  A ──v──→ broker     original_sender = A, final_recipient = B
//! hop 2 (B's shard):  broker ──v──→ B     sender_is_broker
//! ```

use shared_types::{Address, Hash, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
pub struct BrokerBook {
    brokers: Vec<Address>,
    broker_set: HashSet<Address>,
    /// Raw transfers whose first hop is not confirmed yet, by raw hash.
    pending: HashMap<Hash, Transaction>,
}

impl BrokerBook {
    pub fn new(brokers: Vec<Address>) -> Self {
        let broker_set = brokers.iter().cloned().collect();
        Self {
            brokers,
            broker_set,
            pending: HashMap::new(),
        }
    }

    pub fn is_broker(&self, addr: &str) -> bool {
        self.broker_set.contains(addr)
    }

    pub fn brokers(&self) -> &[Address] {
        &self.brokers
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Broker account for a raw transfer, stable for the same transfer.
    fn broker_for(&self, raw: &Transaction) -> Option<&Address> {
        if self.brokers.is_empty() {
            return None;
        }
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&raw.tx_hash[..8]);
        let pick = (u64::from_be_bytes(prefix) % self.brokers.len() as u64) as usize;
        self.brokers.get(pick)
    }

    /// Build hop 1 for `raw` and park `raw` until hop 1 is confirmed.
    ///
    /// Returns `raw` unchanged when no broker is configured.
    pub fn first_hop(&mut self, raw: Transaction) -> Transaction {
        let Some(broker) = self.broker_for(&raw).cloned() else {
            return raw;
        };
        let mut hop = Transaction::new(raw.sender.clone(), broker, raw.value.clone(), raw.nonce);
        hop.time = raw.time;
        hop.has_broker = true;
        hop.original_sender = Some(raw.sender.clone());
        hop.final_recipient = Some(raw.recipient.clone());
        hop.raw_tx_hash = Some(raw.tx_hash);
        self.pending.insert(raw.tx_hash, raw);
        hop
    }

    /// Hop 2 for a committed hop 1, or `None` if the raw transfer is
    /// unknown or already completed.
    pub fn confirm(&mut self, hop1: &Transaction) -> Option<Transaction> {
        let raw_hash = hop1.raw_tx_hash?;
        let Some(raw) = self.pending.remove(&raw_hash) else {
            debug!(sender = %hop1.sender, "[se-04] Confirmation for unknown broker transfer");
            return None;
        };
        let mut hop = Transaction::new(hop1.recipient.clone(), raw.recipient.clone(), raw.value, raw.nonce);
        hop.time = raw.time;
        hop.has_broker = true;
        hop.sender_is_broker = true;
        hop.original_sender = Some(raw.sender);
        hop.final_recipient = Some(raw.recipient);
        hop.raw_tx_hash = Some(raw_hash);
        Some(hop)
    }
}
