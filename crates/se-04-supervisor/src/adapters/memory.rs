//! In-memory transaction source for tests and scripted runs.

use crate::domain::SupervisorResult;
use crate::ports::TxSource;
use shared_types::Transaction;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct MemorySource {
    txs: VecDeque<Transaction>,
}

impl MemorySource {
    pub fn new(txs: Vec<Transaction>) -> Self {
        Self { txs: txs.into() }
    }
}

impl TxSource for MemorySource {
    fn next_batch(&mut self, max: usize) -> SupervisorResult<Vec<Transaction>> {
        let take = max.min(self.txs.len());
        Ok(self.txs.drain(..take).collect())
    }
}
