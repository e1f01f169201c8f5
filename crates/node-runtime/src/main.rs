//! # Shard Emulator Node
//!
//! Entry point for one emulator process: a replica of one shard, or the
//! supervisor (`-c`) that injects transactions and ends the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use emu_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

use node_runtime::{run_shard_node, run_supervisor, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(cli.to_config().context("Invalid configuration")?);

    let telemetry = if cli.supervisor {
        TelemetryConfig::for_supervisor()
    } else {
        TelemetryConfig::for_node(cli.shard_id, cli.node_id)
    };
    let _guard = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    info!("===========================================");
    info!("  Shard Emulator v{}", env!("CARGO_PKG_VERSION"));
    info!("  Strategy: {}", config.strategy);
    info!("  Shards: {} x {} replicas", config.shard_num, config.nodes_per_shard);
    info!("===========================================");

    if cli.supervisor {
        let summary = run_supervisor(config).await?;
        info!(
            injected = summary.injected,
            block_infos = summary.block_infos,
            repartitions = summary.repartitions,
            "Run complete"
        );
    } else {
        run_shard_node(config, cli.shard_id, cli.node_id).await?;
    }
    Ok(())
}
