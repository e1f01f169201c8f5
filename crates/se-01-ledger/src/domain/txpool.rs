//! # Transaction Pool
//!
//! FIFO queue of pending transactions and a per-destination buffer of
//! relayed transactions. All operations take the internal lock for the
//! duration of the call only.

use parking_lot::Mutex;
use shared_types::{now_millis, ShardId, Transaction};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct PoolInner {
    queue: VecDeque<Transaction>,
    relay_pool: HashMap<ShardId, Vec<Transaction>>,
}

#[derive(Debug, Default)]
pub struct TxPool {
    inner: Mutex<PoolInner>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append transactions, stamping the arrival time on first entry.
    pub fn add_txs(&self, txs: Vec<Transaction>) {
        let now = now_millis();
        let mut inner = self.inner.lock();
        for mut tx in txs {
            if tx.time == 0 {
                tx.time = now;
            }
            inner.queue.push_back(tx);
        }
    }

    /// Put transactions back at the head, keeping their order.
    pub fn add_txs_front(&self, txs: Vec<Transaction>) {
        let mut inner = self.inner.lock();
        for tx in txs.into_iter().rev() {
            inner.queue.push_front(tx);
        }
    }

    /// Take up to `max` transactions from the head.
    pub fn pack(&self, max: usize) -> Vec<Transaction> {
        let mut inner = self.inner.lock();
        let n = max.min(inner.queue.len());
        inner.queue.drain(..n).collect()
    }

    /// Buffer a relayed transaction for `shard`.
    pub fn add_relay_tx(&self, tx: Transaction, shard: ShardId) {
        self.inner.lock().relay_pool.entry(shard).or_default().push(tx);
    }

    /// Take and clear the whole relay buffer.
    pub fn take_relay_pool(&self) -> HashMap<ShardId, Vec<Transaction>> {
        std::mem::take(&mut self.inner.lock().relay_pool)
    }

    /// Remove and return every queued transaction matching `pred`.
    ///
    /// Relative order is preserved on both sides.
    pub fn drain_matching<F>(&self, mut pred: F) -> Vec<Transaction>
    where
        F: FnMut(&Transaction) -> bool,
    {
        let mut inner = self.inner.lock();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(inner.queue.len());
        for tx in inner.queue.drain(..) {
            if pred(&tx) {
                taken.push(tx);
            } else {
                kept.push_back(tx);
            }
        }
        inner.queue = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn tx(n: u64) -> Transaction {
        Transaction::new(format!("s{n}"), format!("r{n}"), BigUint::from(1u32), n)
    }

    #[test]
    fn test_pack_is_fifo_and_bounded() {
        let pool = TxPool::new();
        pool.add_txs((0..5).map(tx).collect());
        let packed = pool.pack(3);
        assert_eq!(packed.iter().map(|t| t.nonce).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.pack(10).len(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_add_stamps_time_once() {
        let pool = TxPool::new();
        let mut pre = tx(1);
        pre.time = 7;
        pool.add_txs(vec![pre, tx(2)]);
        let packed = pool.pack(2);
        assert_eq!(packed[0].time, 7);
        assert!(packed[1].time > 0);
    }

    #[test]
    fn test_add_front_keeps_order() {
        let pool = TxPool::new();
        pool.add_txs(vec![tx(3)]);
        pool.add_txs_front(vec![tx(1), tx(2)]);
        let nonces: Vec<_> = pool.pack(3).iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![1, 2, 3]);
    }

    #[test]
    fn test_relay_pool_take_clears() {
        let pool = TxPool::new();
        pool.add_relay_tx(tx(1), 2);
        pool.add_relay_tx(tx(2), 2);
        pool.add_relay_tx(tx(3), 0);
        let relay = pool.take_relay_pool();
        assert_eq!(relay[&2].len(), 2);
        assert_eq!(relay[&0].len(), 1);
        assert!(pool.take_relay_pool().is_empty());
    }

    #[test]
    fn test_drain_matching() {
        let pool = TxPool::new();
        pool.add_txs((0..6).map(tx).collect());
        let even = pool.drain_matching(|t| t.nonce % 2 == 0);
        assert_eq!(even.iter().map(|t| t.nonce).collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(pool.pack(10).iter().map(|t| t.nonce).collect::<Vec<_>>(), vec![1, 3, 5]);
    }
}
