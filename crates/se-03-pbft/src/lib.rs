//! # se-03-pbft
//!
//! Per-shard Byzantine agreement and the cross-shard protocols plugged
//! into it.
//!
//! ## Role in System
//!
//! Each shard runs `N = 3f + 1` replicas of [`ShardNode`]. Replica 0 is the
//! fixed primary: it proposes one request per sequence number, either a
//! block or, while a repartition is pending, an account-migration record.
//! What a proposal contains and what a commit does is decided by the
//! [`Strategy`] chosen at construction:
//!
//! | Mode | Cross-shard transfers | Repartition |
//! |------|-----------------------|-------------|
//! | `Relay` | relayed to the recipient shard | no |
//! | `Broker` | two local hops via a broker account | no |
//! | `CLPA` | relayed | yes |
//! | `CLPA_Broker` | two hops | yes |
//!
//! ## Thresholds
//!
//! With `f = (N - 1) / 3`, a replica sends Commit after `2f` distinct
//! Prepare voters and commits after `2f + 1` distinct Commit voters.
//! There is no view change: a crashed primary stalls its shard.
//!
//! ## Modules
//!
//! - [`domain`]: replica state, quorum rules, [`Barrier`], migration round
//! - [`context`]: identity, collaborators and addressing of one replica
//! - [`strategy`]: Relay, Broker and the migration coordinator
//! - [`service`]: the replica itself

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod context;
pub mod domain;
pub mod service;
pub mod strategy;

pub use context::{NodeContext, PRIMARY_INDEX};
pub use domain::{Barrier, ConsensusError, ConsensusResult, PbftState};
pub use service::ShardNode;
pub use strategy::{MigrationCoordinator, Strategy};
