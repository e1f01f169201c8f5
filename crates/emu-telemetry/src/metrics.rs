//! Prometheus metrics for shard nodes and the supervisor.
//!
//! Naming convention: `se_<area>_<metric>_<unit>`. Per-shard series carry a
//! `shard` label.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::{Arc, Once};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONSENSUS
    // =========================================================================

    /// Requests committed, by kind (block/migration)
    pub static ref BLOCKS_COMMITTED: CounterVec = CounterVec::new(
        Opts::new("se_pbft_requests_committed_total", "Requests committed by PBFT"),
        &["shard", "kind"]
    ).expect("metric creation failed");

    /// Messages dropped by a protocol check
    pub static ref PROTOCOL_REJECTIONS: CounterVec = CounterVec::new(
        Opts::new("se_pbft_rejections_total", "Consensus messages rejected"),
        &["shard", "reason"]  // reason: digest/stale/invalid_block/missing_request
    ).expect("metric creation failed");

    /// Catch-up requests issued by lagging replicas
    pub static ref CATCH_UP_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("se_pbft_catch_up_requests_total", "Catch-up requests sent"),
        &["shard"]
    ).expect("metric creation failed");

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Transactions applied to the ledger
    pub static ref TXS_EXECUTED: CounterVec = CounterVec::new(
        Opts::new("se_ledger_txs_executed_total", "Transactions applied to the ledger"),
        &["shard"]
    ).expect("metric creation failed");

    /// Transactions forwarded to another shard
    pub static ref RELAY_TXS_SENT: CounterVec = CounterVec::new(
        Opts::new("se_relay_txs_sent_total", "Cross-shard transactions relayed"),
        &["shard"]
    ).expect("metric creation failed");

    /// Pending transactions
    pub static ref TX_POOL_SIZE: GaugeVec = GaugeVec::new(
        Opts::new("se_txpool_pending", "Pending transactions in the pool"),
        &["shard"]
    ).expect("metric creation failed");

    // =========================================================================
    // MIGRATION
    // =========================================================================

    /// Migration rounds, by outcome (committed/postponed)
    pub static ref MIGRATION_ROUNDS: CounterVec = CounterVec::new(
        Opts::new("se_migration_rounds_total", "Account migration rounds"),
        &["shard", "outcome"]
    ).expect("metric creation failed");

    // =========================================================================
    // SUPERVISOR
    // =========================================================================

    /// Transactions injected into a shard, by destination
    pub static ref TXS_INJECTED: CounterVec = CounterVec::new(
        Opts::new("se_supervisor_txs_injected_total", "Transactions injected by the supervisor"),
        &["shard"]
    ).expect("metric creation failed");

    /// Block reports received from shard primaries
    pub static ref BLOCK_INFOS_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("se_supervisor_block_infos_total", "Block reports received by the supervisor"),
        &["shard"]
    ).expect("metric creation failed");

    /// CLPA runs, by outcome (sent/skipped/unconfirmed)
    pub static ref REPARTITIONS: CounterVec = CounterVec::new(
        Opts::new("se_supervisor_repartitions_total", "CLPA repartition runs"),
        &["outcome"]
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Handle to the registered metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BLOCKS_COMMITTED.clone()),
            Box::new(PROTOCOL_REJECTIONS.clone()),
            Box::new(CATCH_UP_REQUESTS.clone()),
            Box::new(TXS_EXECUTED.clone()),
            Box::new(RELAY_TXS_SENT.clone()),
            Box::new(TX_POOL_SIZE.clone()),
            Box::new(MIGRATION_ROUNDS.clone()),
            Box::new(TXS_INJECTED.clone()),
            Box::new(BLOCK_INFOS_RECEIVED.clone()),
            Box::new(REPARTITIONS.clone()),
        ];
        for metric in metrics {
            if let Err(e) = REGISTRY.register(metric) {
                result = Err(TelemetryError::MetricsInit(e.to_string()));
                return;
            }
        }
    });
    result?;

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_counter_increment() {
        BLOCKS_COMMITTED.with_label_values(&["0", "block"]).inc();
        assert!(BLOCKS_COMMITTED.with_label_values(&["0", "block"]).get() >= 1.0);
    }

    #[test]
    fn test_gauge_set() {
        TX_POOL_SIZE.with_label_values(&["7"]).set(42.0);
        assert_eq!(TX_POOL_SIZE.with_label_values(&["7"]).get(), 42.0);
    }

    #[test]
    fn test_encode_contains_registered_series() {
        register_metrics().unwrap();
        MIGRATION_ROUNDS.with_label_values(&["1", "committed"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("se_migration_rounds_total"));
    }
}
