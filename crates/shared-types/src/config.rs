//! # Emulator Configuration
//!
//! One immutable value describing the whole deployment: shard layout,
//! protocol parameters and the address of every node. It is built once at
//! startup, validated, then shared read-only behind an `Arc`.

use crate::codec::digest;
use crate::entities::{Address, NodeIndex, ShardId};
use crate::errors::ConfigError;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Pseudo shard id addressing the supervisor (block-info collector).
pub const COLLECTOR_SHARD: ShardId = 0xffff_ffff;

/// Cross-shard execution mode, chosen once per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    ClpaBroker,
    Clpa,
    Broker,
    Relay,
}

impl StrategyKind {
    /// Map the numeric mode id used on the command line.
    pub fn from_mod_id(id: u64) -> Result<Self, ConfigError> {
        match id {
            0 => Ok(Self::ClpaBroker),
            1 => Ok(Self::Clpa),
            2 => Ok(Self::Broker),
            3 => Ok(Self::Relay),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClpaBroker => "CLPA_Broker",
            Self::Clpa => "CLPA",
            Self::Broker => "Broker",
            Self::Relay => "Relay",
        }
    }

    /// Cross-shard transfers go through broker accounts.
    pub fn uses_broker(&self) -> bool {
        matches!(self, Self::ClpaBroker | Self::Broker)
    }

    /// Accounts are periodically repartitioned with CLPA.
    pub fn uses_clpa(&self) -> bool {
        matches!(self, Self::ClpaBroker | Self::Clpa)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLPA_Broker" => Ok(Self::ClpaBroker),
            "CLPA" => Ok(Self::Clpa),
            "Broker" => Ok(Self::Broker),
            "Relay" => Ok(Self::Relay),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// CLPA tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClpaParams {
    /// Penalty β applied to already heavy shards.
    pub weight_penalty: f64,
    /// Maximum label propagation passes (τ).
    pub max_iterations: usize,
    /// A vertex is not relabelled more often than this.
    pub retry_cap: u32,
    /// Interval between two repartitions, in milliseconds.
    pub frequency_ms: u64,
}

impl Default for ClpaParams {
    fn default() -> Self {
        Self {
            weight_penalty: 0.5,
            max_iterations: 100,
            retry_cap: 50,
            frequency_ms: 100_000,
        }
    }
}

/// Bounds for the cross-shard migration barriers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            poll_interval_ms: 50,
        }
    }
}

/// Network addresses of every node, keyed by `(shard, node)`.
///
/// Default layout is `ip:(base_port + shard * 100 + node)`. Individual
/// entries can be overridden, which the in-memory tests use to give each
/// replica a readable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTable {
    pub ip: String,
    pub base_port: u16,
    pub supervisor_addr: String,
    pub overrides: HashMap<(ShardId, NodeIndex), String>,
}

impl Default for NodeTable {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            base_port: 28800,
            supervisor_addr: "127.0.0.1:18800".to_string(),
            overrides: HashMap::new(),
        }
    }
}

impl NodeTable {
    /// Address of one node. The collector shard resolves to the supervisor.
    pub fn addr(&self, shard: ShardId, node: NodeIndex) -> String {
        if shard == COLLECTOR_SHARD {
            return self.supervisor_addr.clone();
        }
        if let Some(addr) = self.overrides.get(&(shard, node)) {
            return addr.clone();
        }
        let port = u64::from(self.base_port) + shard * 100 + node;
        format!("{}:{}", self.ip, port)
    }

    pub fn supervisor(&self) -> &str {
        &self.supervisor_addr
    }

    /// Address of a shard's primary (node 0).
    pub fn primary(&self, shard: ShardId) -> String {
        self.addr(shard, 0)
    }
}

/// Complete deployment description shared by all components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    pub shard_num: u64,
    pub nodes_per_shard: u64,
    /// Pause between two proposals, in milliseconds.
    pub block_interval_ms: u64,
    pub max_block_size: usize,
    /// Transactions injected per second by the supervisor.
    pub inject_speed: usize,
    pub total_data_size: usize,
    pub batch_size: usize,
    pub broker_num: usize,
    pub strategy: StrategyKind,
    pub clpa: ClpaParams,
    pub barrier: BarrierConfig,
    /// Committed sequences a replica keeps, with their requests and votes,
    /// to serve catch-up.
    pub request_retention: u64,
    /// Balance of an account the first time it is seen.
    pub init_balance: BigUint,
    /// Consecutive empty block infos before the supervisor stops the run.
    pub stop_threshold: usize,
    pub dataset_path: Option<PathBuf>,
    pub nodes: NodeTable,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            shard_num: 4,
            nodes_per_shard: 4,
            block_interval_ms: 5000,
            max_block_size: 2000,
            inject_speed: 2000,
            total_data_size: 100_000,
            batch_size: 16_000,
            broker_num: 10,
            strategy: StrategyKind::Relay,
            clpa: ClpaParams::default(),
            barrier: BarrierConfig::default(),
            request_retention: 1000,
            init_balance: BigUint::from(10u32).pow(44),
            stop_threshold: 8,
            dataset_path: None,
            nodes: NodeTable::default(),
        }
    }
}

impl EmulatorConfig {
    /// Small, fast layout for tests: 2 shards of 4 replicas, short timers.
    pub fn for_testing() -> Self {
        Self {
            shard_num: 2,
            nodes_per_shard: 4,
            block_interval_ms: 20,
            max_block_size: 100,
            inject_speed: 100,
            total_data_size: 1000,
            batch_size: 500,
            broker_num: 2,
            barrier: BarrierConfig {
                timeout_ms: 2000,
                poll_interval_ms: 5,
            },
            stop_threshold: 4,
            ..Self::default()
        }
    }

    /// Reject layouts no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_num == 0 {
            return Err(ConfigError::NoShards);
        }
        if self.nodes_per_shard == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.max_block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.request_retention == 0 {
            return Err(ConfigError::ZeroRetention);
        }
        let beta = self.clpa.weight_penalty;
        if !(0.0..=1.0).contains(&beta) {
            return Err(ConfigError::InvalidWeightPenalty(beta.to_string()));
        }
        Ok(())
    }

    /// Check that `(shard, node)` exists in this layout.
    pub fn check_node(&self, shard: ShardId, node: NodeIndex) -> Result<(), ConfigError> {
        if shard >= self.shard_num || node >= self.nodes_per_shard {
            return Err(ConfigError::UnknownNode { shard, node });
        }
        Ok(())
    }

    /// Byzantine fault tolerance `f = (N - 1) / 3`.
    pub fn fault_tolerance(&self) -> u64 {
        self.nodes_per_shard.saturating_sub(1) / 3
    }

    /// Addresses of every replica in `shard`, primary first.
    pub fn shard_addrs(&self, shard: ShardId) -> Vec<String> {
        (0..self.nodes_per_shard)
            .map(|node| self.nodes.addr(shard, node))
            .collect()
    }

    /// Every node address across all shards.
    pub fn all_node_addrs(&self) -> Vec<String> {
        (0..self.shard_num)
            .flat_map(|shard| self.shard_addrs(shard))
            .collect()
    }

    /// Deterministic broker account addresses (40 hex chars each).
    pub fn broker_addresses(&self) -> Vec<Address> {
        (0..self.broker_num)
            .map(|i| hex::encode(&digest(format!("broker-{i}").as_bytes())[..20]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_parameters() {
        let config = EmulatorConfig::default();
        assert_eq!(config.shard_num, 4);
        assert_eq!(config.nodes_per_shard, 4);
        assert_eq!(config.block_interval_ms, 5000);
        assert_eq!(config.fault_tolerance(), 1);
        assert_eq!(config.init_balance.to_string().len(), 45);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_node_table_layout() {
        let table = NodeTable::default();
        assert_eq!(table.addr(0, 0), "127.0.0.1:28800");
        assert_eq!(table.addr(2, 3), "127.0.0.1:29003");
        assert_eq!(table.addr(COLLECTOR_SHARD, 0), "127.0.0.1:18800");
    }

    #[test]
    fn test_node_table_override() {
        let mut table = NodeTable::default();
        table.overrides.insert((1, 2), "s1n2".to_string());
        assert_eq!(table.addr(1, 2), "s1n2");
        assert_eq!(table.addr(1, 1), "127.0.0.1:28901");
    }

    #[test]
    fn test_strategy_mod_ids() {
        assert_eq!(StrategyKind::from_mod_id(0).unwrap(), StrategyKind::ClpaBroker);
        assert_eq!(StrategyKind::from_mod_id(3).unwrap(), StrategyKind::Relay);
        assert!(StrategyKind::from_mod_id(9).is_err());
        assert_eq!("CLPA".parse::<StrategyKind>().unwrap(), StrategyKind::Clpa);
        assert!(StrategyKind::ClpaBroker.uses_broker());
        assert!(!StrategyKind::Relay.uses_clpa());
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        let mut config = EmulatorConfig::for_testing();
        config.shard_num = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoShards));

        let mut config = EmulatorConfig::for_testing();
        config.clpa.weight_penalty = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeightPenalty(_))
        ));

        let mut config = EmulatorConfig::for_testing();
        config.request_retention = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroRetention));

        let config = EmulatorConfig::for_testing();
        assert!(config.check_node(1, 3).is_ok());
        assert!(config.check_node(2, 0).is_err());
    }

    #[test]
    fn test_broker_addresses_are_stable() {
        let config = EmulatorConfig::default();
        let a = config.broker_addresses();
        assert_eq!(a.len(), 10);
        assert_eq!(a, config.broker_addresses());
        assert!(a.iter().all(|addr| addr.len() == 40));
    }
}
