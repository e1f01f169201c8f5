//! Inbound port of the ledger subsystem.
//!
//! Consensus and the migration coordinator drive the ledger only through
//! this trait.

use crate::domain::{LedgerResult, PartitionTable, TxPool};
use shared_types::{AccountState, Address, Block, NodeIndex, ShardId};

/// The shard-local chain, state and pools of one replica.
pub trait Ledger: Send + Sync {
    /// Shard this ledger belongs to.
    fn shard_id(&self) -> ShardId;

    /// Head of the chain.
    fn current_block(&self) -> Block;

    /// Number of the head block (genesis is 0).
    fn height(&self) -> u64 {
        self.current_block().header.number
    }

    fn tx_pool(&self) -> &TxPool;

    fn partition(&self) -> &PartitionTable;

    /// Pack pending transactions into a candidate block on top of the head.
    ///
    /// Account state is left unchanged; the candidate carries the root the
    /// state would have after applying it.
    fn generate_block(&self, miner: NodeIndex) -> LedgerResult<Block>;

    /// Check parent linkage and transaction root of a candidate.
    fn is_valid_block(&self, block: &Block) -> LedgerResult<()>;

    /// Append a committed block and apply its body.
    ///
    /// Returns `Ok(false)` when `block` does not extend the head.
    fn add_block(&self, block: &Block) -> LedgerResult<bool>;

    /// States of `addrs`; unknown accounts report the initial balance.
    fn fetch_accounts(&self, addrs: &[Address]) -> Vec<AccountState>;

    /// Install migrated accounts this shard now owns and seal the change
    /// with an empty block.
    fn add_accounts(&self, addrs: &[Address], states: &[AccountState]) -> LedgerResult<Block>;

    /// State of a single account, if this replica has ever touched it.
    fn account(&self, addr: &str) -> Option<AccountState>;
}
