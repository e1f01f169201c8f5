//! # Emulator Telemetry
//!
//! Logging and metrics for shard nodes and the supervisor.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use emu_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_node(2, 0);
//! let _guard = init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `SE_JSON_LOGS` | `false` | Emit JSON lines instead of text |
//! | `SE_SERVICE_NAME` | `shard-emulator` | Service name in log lines |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_tracing;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, BLOCKS_COMMITTED, BLOCK_INFOS_RECEIVED,
    CATCH_UP_REQUESTS, MIGRATION_ROUNDS, PROTOCOL_REJECTIONS, RELAY_TXS_SENT, REPARTITIONS,
    TXS_EXECUTED, TXS_INJECTED, TX_POOL_SIZE,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Install the subscriber and register metrics.
///
/// Returns a guard that must be held for the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_tracing(config)?;
    tracing::info!(service = %config.service_name, "[telemetry] initialized");
    Ok(TelemetryGuard { _metrics: metrics })
}

/// Keeps telemetry alive. Dropping it logs the shutdown.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("[telemetry] shutting down");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
