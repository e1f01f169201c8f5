//! # Shard-Emulator Test Suite
//!
//! Whole runs of the emulator inside one process: every replica of every
//! shard plus the supervisor, wired through an
//! [`InMemoryNetwork`](shared_net::InMemoryNetwork).
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Cluster: start, run to completion, inspect ledgers
//! └── integration/      # Relay, Broker and CLPA migration flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p se-tests
//! cargo test -p se-tests integration::
//! ```

#![allow(clippy::expect_used)]

pub mod harness;
pub mod integration;
