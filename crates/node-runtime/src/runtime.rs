//! # Process Runtime
//!
//! Wires the TCP transport, the accept loop and either a [`ShardNode`] or
//! the [`Supervisor`], and tears them down in order.
//!
//! ## Shutdown
//!
//! A replica ends when it receives `stop` (or on Ctrl-C, which stops it
//! locally). The supervisor ends after it has sent `stop` to every node.
//! In both cases the accept loop is signalled last.

use anyhow::{Context, Result};
use se_01_ledger::{InMemoryLedger, Ledger};
use se_03_pbft::ShardNode;
use se_04_supervisor::{CsvDataset, RunSummary, Supervisor, TxSource};
use shared_net::{spawn_listener, TcpTransport};
use shared_types::{EmulatorConfig, NodeIndex, ShardId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Run one replica until it is told to stop.
pub async fn run_shard_node(config: Arc<EmulatorConfig>, shard_id: ShardId, node_id: NodeIndex) -> Result<()> {
    let addr = config.nodes.addr(shard_id, node_id);
    let (inbox_tx, inbox) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = spawn_listener(&addr, inbox_tx, shutdown_rx)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;

    let ledger = Arc::new(
        InMemoryLedger::from_config(shard_id, &config).context("Failed to create ledger")?,
    );
    let node = Arc::new(
        ShardNode::from_config(config, shard_id, node_id, ledger, Arc::new(TcpTransport::new()))
            .context("Failed to create replica")?,
    );
    info!(shard = shard_id, node = node_id, addr = %addr, "Replica running");

    let mut runner = tokio::spawn(node.clone().run(inbox));
    let joined = tokio::select! {
        joined = &mut runner => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!(shard = shard_id, node = node_id, "Interrupted, stopping replica");
            node.stop().await;
            runner.await
        }
    };

    shutdown_tx.send_replace(true);
    if let Err(e) = listener.await {
        warn!(error = %e, "Accept loop ended abnormally");
    }
    joined
        .context("Replica task panicked")?
        .context("Replica failed")?;
    info!(shard = shard_id, node = node_id, height = node.context().ledger.height(), "Replica stopped");
    Ok(())
}

/// Run the supervisor over the configured dataset.
pub async fn run_supervisor(config: Arc<EmulatorConfig>) -> Result<RunSummary> {
    let path = config
        .dataset_path
        .clone()
        .context("No dataset configured for the supervisor")?;
    let source = CsvDataset::open(&path, config.total_data_size)
        .with_context(|| format!("Failed to open dataset {}", path.display()))?;
    run_supervisor_with(config, Box::new(source)).await
}

/// Run the supervisor over any transaction source.
pub async fn run_supervisor_with(config: Arc<EmulatorConfig>, source: Box<dyn TxSource>) -> Result<RunSummary> {
    let addr = config.nodes.supervisor().to_string();
    let (inbox_tx, inbox) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = spawn_listener(&addr, inbox_tx, shutdown_rx)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;

    let supervisor = Arc::new(
        Supervisor::new(config, Arc::new(TcpTransport::new())).context("Failed to create supervisor")?,
    );
    info!(addr = %addr, "Supervisor running");
    let result = supervisor.run(inbox, source).await;

    shutdown_tx.send_replace(true);
    if let Err(e) = listener.await {
        warn!(error = %e, "Accept loop ended abnormally");
    }
    result.context("Supervisor failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use se_04_supervisor::MemorySource;
    use shared_types::{StrategyKind, Transaction};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn free_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    /// One shard of one replica plus the supervisor, over real sockets.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_replica_run_over_tcp() {
        let mut config = EmulatorConfig::for_testing();
        config.shard_num = 1;
        config.nodes_per_shard = 1;
        config.strategy = StrategyKind::Relay;
        config.nodes.supervisor_addr = free_addr().await;
        config.nodes.overrides.insert((0, 0), free_addr().await);
        let config = Arc::new(config);

        let replica = tokio::spawn(run_shard_node(config.clone(), 0, 0));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let txs = vec![
            Transaction::new("a0000000".into(), "b0000000".into(), BigUint::from(4u32), 0),
            Transaction::new("c0000000".into(), "b0000000".into(), BigUint::from(6u32), 1),
        ];
        let summary = timeout(
            Duration::from_secs(20),
            run_supervisor_with(config.clone(), Box::new(MemorySource::new(txs))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(summary.injected, 2);
        assert!(summary.block_infos >= config.stop_threshold as u64);

        timeout(Duration::from_secs(10), replica)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
