//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `Transaction`, `BlockHeader`, `Block`
//! - **State**: `AccountState`
//! - **Consensus**: `Request`, `RequestKind`, `SeqRange`
//! - **Addressing**: `Address`, `ShardId`, `NodeIndex`, default shard hashing

use crate::codec::{digest, encode};
use crate::errors::CodecResult;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use num_bigint::BigUint as Balance;

// =============================================================================
// CLUSTER A: ADDRESSING
// =============================================================================

/// A 32-byte SHA-256 hash.
pub type Hash = [u8; 32];

/// Account address as a lowercase hex string without `0x` prefix.
pub type Address = String;

/// Shard identifier.
pub type ShardId = u64;

/// Replica index inside a shard. Index 0 is the primary.
pub type NodeIndex = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// Default shard for an address that has never been migrated.
///
/// The last 8 hex characters are read as an integer and reduced modulo
/// `shard_num`. Addresses that are too short or not hex fall back to the
/// first 8 bytes of their SHA-256 digest.
pub fn default_shard(addr: &str, shard_num: u64) -> ShardId {
    if shard_num == 0 {
        return 0;
    }
    let tail = addr.len().checked_sub(8).and_then(|start| addr.get(start..));
    match tail.and_then(|t| u64::from_str_radix(t, 16).ok()) {
        Some(num) => num % shard_num,
        None => {
            let h = digest(addr.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&h[..8]);
            u64::from_be_bytes(head) % shard_num
        }
    }
}

// =============================================================================
// CLUSTER B: THE CHAIN
// =============================================================================

/// A value transfer between two accounts.
///
/// Signatures are not modelled. Broker bookkeeping fields are only set on
/// the two hops generated for a broker-mediated cross-shard transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub value: BigUint,
    pub nonce: u64,
    /// Content hash over `(sender, recipient, value, nonce)`.
    pub tx_hash: Hash,
    /// Time the transaction first entered a pool (0 = not yet pooled).
    pub time: Timestamp,
    /// Set once the sender side executed and the tx was forwarded.
    pub relayed: bool,
    pub has_broker: bool,
    pub sender_is_broker: bool,
    pub original_sender: Option<Address>,
    pub final_recipient: Option<Address>,
    /// Hash of the raw transaction a broker hop was derived from.
    pub raw_tx_hash: Option<Hash>,
}

#[derive(Serialize)]
struct TxContent<'a> {
    sender: &'a str,
    recipient: &'a str,
    value: &'a BigUint,
    nonce: u64,
}

impl Transaction {
    /// Build a plain transfer and compute its content hash.
    pub fn new(sender: Address, recipient: Address, value: BigUint, nonce: u64) -> Self {
        let tx_hash = Self::content_hash(&sender, &recipient, &value, nonce);
        Self {
            sender,
            recipient,
            value,
            nonce,
            tx_hash,
            time: 0,
            relayed: false,
            has_broker: false,
            sender_is_broker: false,
            original_sender: None,
            final_recipient: None,
            raw_tx_hash: None,
        }
    }

    fn content_hash(sender: &str, recipient: &str, value: &BigUint, nonce: u64) -> Hash {
        let content = TxContent {
            sender,
            recipient,
            value,
            nonce,
        };
        // Serializing borrowed strings and a BigUint cannot fail.
        let bytes = encode(&content).unwrap_or_default();
        digest(&bytes)
    }

    /// Whether this is the first hop of a broker transfer.
    pub fn is_broker_hop1(&self) -> bool {
        self.original_sender.as_deref() == Some(self.sender.as_str())
    }

    /// Whether this is the second hop of a broker transfer.
    pub fn is_broker_hop2(&self) -> bool {
        self.final_recipient.as_deref() == Some(self.recipient.as_str())
    }
}

/// Header of a shard block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    pub parent_hash: Hash,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub number: u64,
    pub time: Timestamp,
    /// Index of the replica that produced the block.
    pub miner: NodeIndex,
}

impl BlockHeader {
    /// SHA-256 over the canonical header encoding.
    pub fn hash(&self) -> CodecResult<Hash> {
        Ok(digest(&encode(self)?))
    }
}

/// A shard block: header, ordered body and cached header hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: Vec<Transaction>,
    pub hash: Hash,
}

impl Block {
    /// Assemble a block and fill in its hash.
    pub fn new(header: BlockHeader, body: Vec<Transaction>) -> CodecResult<Self> {
        let hash = header.hash()?;
        Ok(Self { header, body, hash })
    }
}

// =============================================================================
// CLUSTER C: STATE
// =============================================================================

/// Per-account state. Balances are arbitrary precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: BigUint,
    pub storage_root: Option<Hash>,
    pub code_hash: Option<Hash>,
}

impl AccountState {
    /// A fresh account holding `balance`.
    pub fn with_balance(balance: BigUint) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Subtract `value` if the balance covers it.
    ///
    /// Returns `false` and leaves the balance untouched otherwise.
    pub fn deduct(&mut self, value: &BigUint) -> bool {
        if self.balance < *value {
            return false;
        }
        self.balance -= value;
        true
    }

    /// Add `value` to the balance.
    pub fn deposit(&mut self, value: &BigUint) {
        self.balance += value;
    }
}

// =============================================================================
// CLUSTER D: CONSENSUS
// =============================================================================

/// What a consensus request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// An encoded [`Block`].
    Block,
    /// An encoded account-migration record.
    PartitionMigration,
}

/// One request ordered by PBFT. Identified by its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    pub payload: Vec<u8>,
    pub proposed_at: Timestamp,
}

impl Request {
    /// Create a request stamped with the current time.
    pub fn new(kind: RequestKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            proposed_at: now_millis(),
        }
    }

    /// Content digest of the canonical encoding.
    pub fn digest(&self) -> CodecResult<Hash> {
        Ok(digest(&encode(self)?))
    }
}

/// Inclusive range of sequence numbers, used by catch-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRange {
    pub start: u64,
    pub end: u64,
}

impl SeqRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of heights covered (0 when `end < start`), saturating at
    /// `usize::MAX`.
    pub fn len(&self) -> usize {
        match self.end.checked_sub(self.start) {
            None => 0,
            Some(span) => usize::try_from(span)
                .ok()
                .and_then(|span| span.checked_add(1))
                .unwrap_or(usize::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
