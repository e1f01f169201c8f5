//! Multi-shard flows.

pub mod flows;
