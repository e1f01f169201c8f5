//! # In-Memory Ledger
//!
//! Chain and account state held behind one `RwLock`. The pool and the
//! partition table carry their own locks so packing or routing never
//! waits on block application.

use crate::domain::{
    apply_transactions, state_root, tx_root, ExecutionContext, LedgerError, LedgerResult,
    PartitionTable, TxPool,
};
use crate::ports::Ledger;
use num_bigint::BigUint;
use parking_lot::RwLock;
use shared_types::{
    hash_hex, now_millis, AccountState, Address, Block, BlockHeader, NodeIndex, ShardId,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

struct ChainState {
    blocks: Vec<Block>,
    accounts: BTreeMap<Address, AccountState>,
}

impl ChainState {
    fn head(&self) -> &Block {
        // Genesis is pushed at construction and never removed.
        &self.blocks[self.blocks.len() - 1]
    }
}

pub struct InMemoryLedger {
    shard_id: ShardId,
    init_balance: BigUint,
    max_block_size: usize,
    pool: TxPool,
    partition: PartitionTable,
    state: RwLock<ChainState>,
}

impl InMemoryLedger {
    pub fn new(
        shard_id: ShardId,
        shard_num: u64,
        init_balance: BigUint,
        max_block_size: usize,
    ) -> LedgerResult<Self> {
        let accounts = BTreeMap::new();
        let header = BlockHeader {
            state_root: state_root(&accounts)?,
            tx_root: tx_root(&[])?,
            ..BlockHeader::default()
        };
        let genesis = Block::new(header, Vec::new())?;
        debug!(
            shard = shard_id,
            genesis = %hash_hex(&genesis.hash),
            "[se-01] Ledger initialized"
        );
        Ok(Self {
            shard_id,
            init_balance,
            max_block_size,
            pool: TxPool::new(),
            partition: PartitionTable::new(shard_num),
            state: RwLock::new(ChainState {
                blocks: vec![genesis],
                accounts,
            }),
        })
    }

    /// Ledger built from the shared emulator settings.
    pub fn from_config(shard_id: ShardId, config: &shared_types::EmulatorConfig) -> LedgerResult<Self> {
        Self::new(
            shard_id,
            config.shard_num,
            config.init_balance.clone(),
            config.max_block_size,
        )
    }

    /// Sum of all balances this replica holds.
    pub fn total_balance(&self) -> BigUint {
        self.state
            .read()
            .accounts
            .values()
            .map(|a| a.balance.clone())
            .sum()
    }

    /// Number of blocks including genesis.
    pub fn chain_len(&self) -> usize {
        self.state.read().blocks.len()
    }

    fn context(&self) -> ExecutionContext<'_> {
        ExecutionContext {
            shard_id: self.shard_id,
            partition: &self.partition,
            init_balance: &self.init_balance,
        }
    }
}

impl Ledger for InMemoryLedger {
    fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    fn current_block(&self) -> Block {
        self.state.read().head().clone()
    }

    fn tx_pool(&self) -> &TxPool {
        &self.pool
    }

    fn partition(&self) -> &PartitionTable {
        &self.partition
    }

    fn generate_block(&self, miner: NodeIndex) -> LedgerResult<Block> {
        let body = self.pool.pack(self.max_block_size);
        let state = self.state.read();
        let mut preview = state.accounts.clone();
        apply_transactions(&mut preview, &body, &self.context());
        let head = state.head();
        let header = BlockHeader {
            parent_hash: head.hash,
            state_root: state_root(&preview)?,
            tx_root: tx_root(&body)?,
            number: head.header.number + 1,
            time: now_millis(),
            miner,
        };
        Ok(Block::new(header, body)?)
    }

    fn is_valid_block(&self, block: &Block) -> LedgerResult<()> {
        let head_hash = self.state.read().head().hash;
        if block.header.parent_hash != head_hash {
            return Err(LedgerError::ParentMismatch {
                expected: head_hash,
                actual: block.header.parent_hash,
            });
        }
        if block.header.tx_root != tx_root(&block.body)? {
            return Err(LedgerError::TxRootMismatch);
        }
        Ok(())
    }

    fn add_block(&self, block: &Block) -> LedgerResult<bool> {
        let mut state = self.state.write();
        let current = state.head().header.number;
        if block.header.number != current + 1 {
            warn!(
                shard = self.shard_id,
                current,
                got = block.header.number,
                "[se-01] Block does not extend the head, ignored"
            );
            return Ok(false);
        }
        let stats = apply_transactions(&mut state.accounts, &block.body, &self.context());
        let root = state_root(&state.accounts)?;
        if root != block.header.state_root {
            warn!(
                shard = self.shard_id,
                number = block.header.number,
                "[se-01] State root differs from the proposed one"
            );
        }
        state.blocks.push(block.clone());
        debug!(
            shard = self.shard_id,
            number = block.header.number,
            txs = block.body.len(),
            skipped = stats.skipped,
            "[se-01] Block added"
        );
        Ok(true)
    }

    fn fetch_accounts(&self, addrs: &[Address]) -> Vec<AccountState> {
        let state = self.state.read();
        addrs
            .iter()
            .map(|addr| {
                state
                    .accounts
                    .get(addr)
                    .cloned()
                    .unwrap_or_else(|| AccountState::with_balance(self.init_balance.clone()))
            })
            .collect()
    }

    fn add_accounts(&self, addrs: &[Address], states: &[AccountState]) -> LedgerResult<Block> {
        if addrs.len() != states.len() {
            return Err(LedgerError::LengthMismatch {
                addrs: addrs.len(),
                states: states.len(),
            });
        }
        let mut state = self.state.write();
        let mut installed = 0usize;
        for (addr, account) in addrs.iter().zip(states) {
            if self.partition.get(addr) == self.shard_id {
                state.accounts.insert(addr.clone(), account.clone());
                installed += 1;
            }
        }
        let head = state.head();
        let header = BlockHeader {
            parent_hash: head.hash,
            state_root: state_root(&state.accounts)?,
            tx_root: tx_root(&[])?,
            number: head.header.number + 1,
            time: 0,
            miner: 0,
        };
        let block = Block::new(header, Vec::new())?;
        state.blocks.push(block.clone());
        info!(
            shard = self.shard_id,
            installed,
            offered = addrs.len(),
            height = block.header.number,
            "[se-01] Migrated accounts installed"
        );
        Ok(block)
    }

    fn account(&self, addr: &str) -> Option<AccountState> {
        self.state.read().accounts.get(addr).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Transaction;

    const A0: &str = "00000000000000000000000000000000000000a0";
    const B0: &str = "00000000000000000000000000000000000000b0";
    const C1: &str = "00000000000000000000000000000000000000c1";

    fn ledger(shard: ShardId) -> InMemoryLedger {
        InMemoryLedger::new(shard, 2, BigUint::from(1000u32), 10).unwrap()
    }

    fn tx(from: &str, to: &str, value: u32, nonce: u64) -> Transaction {
        Transaction::new(from.into(), to.into(), BigUint::from(value), nonce)
    }

    #[test]
    fn test_generate_does_not_touch_state() {
        let l = ledger(0);
        l.tx_pool().add_txs(vec![tx(A0, B0, 10, 0)]);
        let block = l.generate_block(0).unwrap();
        assert_eq!(block.header.number, 1);
        assert_eq!(block.body.len(), 1);
        assert!(l.account(A0).is_none());
        assert_eq!(l.height(), 0);
    }

    #[test]
    fn test_generate_respects_block_size() {
        let l = ledger(0);
        l.tx_pool().add_txs((0..25).map(|n| tx(A0, B0, 1, n)).collect());
        assert_eq!(l.generate_block(0).unwrap().body.len(), 10);
        assert_eq!(l.tx_pool().len(), 15);
    }

    #[test]
    fn test_replicas_agree_after_add_block() {
        let proposer = ledger(0);
        let backup = ledger(0);
        proposer.tx_pool().add_txs(vec![tx(A0, B0, 10, 0), tx(B0, A0, 3, 0)]);
        let block = proposer.generate_block(0).unwrap();
        backup.is_valid_block(&block).unwrap();

        assert!(proposer.add_block(&block).unwrap());
        assert!(backup.add_block(&block).unwrap());
        assert_eq!(proposer.current_block().hash, backup.current_block().hash);
        assert_eq!(proposer.account(A0), backup.account(A0));
        assert_eq!(proposer.account(A0).unwrap().balance, BigUint::from(993u32));
        assert_eq!(proposer.total_balance(), BigUint::from(2000u32));
    }

    #[test]
    fn test_add_block_rejects_gap() {
        let l = ledger(0);
        let mut block = l.generate_block(0).unwrap();
        block.header.number = 5;
        assert!(!l.add_block(&block).unwrap());
        assert_eq!(l.chain_len(), 1);
    }

    #[test]
    fn test_invalid_parent_and_root() {
        let l = ledger(0);
        l.tx_pool().add_txs(vec![tx(A0, B0, 1, 0)]);
        let good = l.generate_block(0).unwrap();

        let mut orphan = good.clone();
        orphan.header.parent_hash = [9u8; 32];
        assert!(matches!(
            l.is_valid_block(&orphan),
            Err(LedgerError::ParentMismatch { .. })
        ));

        let mut tampered = good;
        tampered.body.push(tx(B0, A0, 1, 1));
        assert!(matches!(
            l.is_valid_block(&tampered),
            Err(LedgerError::TxRootMismatch)
        ));
    }

    #[test]
    fn test_fetch_defaults_to_init_balance() {
        let l = ledger(0);
        let states = l.fetch_accounts(&[A0.to_string()]);
        assert_eq!(states[0].balance, BigUint::from(1000u32));
    }

    #[test]
    fn test_add_accounts_installs_only_owned() {
        let l = ledger(1);
        // A0 now belongs to shard 1, B0 stays on shard 0.
        l.partition().set(A0.to_string(), 1);
        let states = vec![
            AccountState::with_balance(BigUint::from(7u32)),
            AccountState::with_balance(BigUint::from(8u32)),
        ];
        let block = l
            .add_accounts(&[A0.to_string(), B0.to_string()], &states)
            .unwrap();
        assert_eq!(block.header.number, 1);
        assert!(block.body.is_empty());
        assert_eq!(l.account(A0).unwrap().balance, BigUint::from(7u32));
        assert!(l.account(B0).is_none());
        assert_eq!(l.account(C1), None);
    }

    #[test]
    fn test_add_accounts_length_mismatch() {
        let l = ledger(0);
        let err = l.add_accounts(&[A0.to_string()], &[]).unwrap_err();
        assert!(matches!(err, LedgerError::LengthMismatch { addrs: 1, states: 0 }));
    }
}
