//! # Command Line
//!
//! Flags keep the short names of the reference deployment scripts
//! (`-S -N -s -n -m -c`). Everything else has a long form only.

use clap::Parser;
use shared_types::{ConfigError, EmulatorConfig, NodeIndex, ShardId, StrategyKind};
use std::path::PathBuf;

/// Sharded blockchain emulator: one shard replica or the supervisor.
#[derive(Parser, Debug, Clone)]
#[command(name = "node-runtime")]
#[command(about = "Run one replica of a PBFT shard, or the supervisor driving all shards")]
pub struct Cli {
    /// Number of shards
    #[arg(short = 'S', long = "shard-num", default_value_t = 4)]
    pub shard_num: u64,

    /// Replicas per shard
    #[arg(short = 'N', long = "node-num", default_value_t = 4)]
    pub node_num: u64,

    /// Shard of this replica
    #[arg(short = 's', long = "shard-id", default_value_t = 0)]
    pub shard_id: ShardId,

    /// Index of this replica within its shard
    #[arg(short = 'n', long = "node-id", default_value_t = 0)]
    pub node_id: NodeIndex,

    /// Strategy: 0 = CLPA_Broker, 1 = CLPA, 2 = Broker, 3 = Relay
    #[arg(short = 'm', long = "mod-id", default_value_t = 3)]
    pub mod_id: u64,

    /// Run the supervisor instead of a replica
    #[arg(short = 'c', long = "supervisor")]
    pub supervisor: bool,

    /// Transaction dataset (supervisor only)
    #[arg(long, default_value = "selectedTxs_100K.csv")]
    pub dataset: PathBuf,

    /// Milliseconds between two proposals
    #[arg(long)]
    pub block_interval_ms: Option<u64>,

    /// Transactions per block
    #[arg(long)]
    pub max_block_size: Option<usize>,

    /// Transactions injected per second
    #[arg(long)]
    pub inject_speed: Option<usize>,

    /// Dataset rows to inject in total
    #[arg(long)]
    pub total_data_size: Option<usize>,

    /// Number of broker accounts
    #[arg(long)]
    pub broker_num: Option<usize>,

    /// Milliseconds between two CLPA runs
    #[arg(long)]
    pub clpa_frequency_ms: Option<u64>,

    /// CLPA weight penalty in [0, 1]
    #[arg(long)]
    pub weight_penalty: Option<f64>,

    /// IP shared by every replica
    #[arg(long)]
    pub ip: Option<String>,

    /// Supervisor listen address
    #[arg(long)]
    pub supervisor_addr: Option<String>,
}

impl Cli {
    /// Build and validate the deployment description.
    pub fn to_config(&self) -> Result<EmulatorConfig, ConfigError> {
        let mut config = EmulatorConfig {
            shard_num: self.shard_num,
            nodes_per_shard: self.node_num,
            strategy: StrategyKind::from_mod_id(self.mod_id)?,
            stop_threshold: 2 * self.shard_num as usize,
            dataset_path: Some(self.dataset.clone()),
            ..EmulatorConfig::default()
        };
        if let Some(ms) = self.block_interval_ms {
            config.block_interval_ms = ms;
        }
        if let Some(size) = self.max_block_size {
            config.max_block_size = size;
        }
        if let Some(speed) = self.inject_speed {
            config.inject_speed = speed;
        }
        if let Some(total) = self.total_data_size {
            config.total_data_size = total;
        }
        if let Some(num) = self.broker_num {
            config.broker_num = num;
        }
        if let Some(ms) = self.clpa_frequency_ms {
            config.clpa.frequency_ms = ms;
        }
        if let Some(beta) = self.weight_penalty {
            config.clpa.weight_penalty = beta;
        }
        if let Some(ip) = &self.ip {
            config.nodes.ip = ip.clone();
        }
        if let Some(addr) = &self.supervisor_addr {
            config.nodes.supervisor_addr = addr.clone();
        }

        config.validate()?;
        if !self.supervisor {
            config.check_node(self.shard_id, self.node_id)?;
        }
        Ok(config)
    }
}
