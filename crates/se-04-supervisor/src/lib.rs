//! # se-04-supervisor
//!
//! The process that drives an emulation run from outside the shards.
//!
//! ## Role in System
//!
//! - Reads the transaction dataset and injects it into the shard
//!   primaries at `inject_speed` transfers per second, routed by the
//!   sender's current shard.
//! - Collects the block report every primary sends after a commit.
//! - Under a Broker strategy, splits cross-shard transfers into two hops
//!   and releases the second hop once the first is reported committed.
//! - Under a CLPA strategy, feeds every transfer into the transaction
//!   graph and periodically ships a new account assignment to the shards.
//! - Stops every node after `stop_threshold` consecutive empty reports
//!   once the dataset is exhausted.
//!
//! ## Modules
//!
//! - [`domain`]: dataset records, [`Committee`], [`BrokerBook`], stop gap
//! - [`ports`]: [`TxSource`]
//! - [`adapters`]: CSV and in-memory sources
//! - [`service`]: the [`Supervisor`] loop

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{CsvDataset, MemorySource};
pub use domain::{BrokerBook, Committee, StopSignal, SupervisorError, SupervisorResult};
pub use ports::TxSource;
pub use service::{RunSummary, Supervisor, INJECT_PERIOD};
