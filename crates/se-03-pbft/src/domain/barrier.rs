//! # Barrier
//!
//! A named wait on a cross-shard condition. The condition is polled at a
//! fixed interval until it holds, the deadline passes, or the replica is
//! told to stop.

use crate::domain::errors::{ConsensusError, ConsensusResult};
use shared_types::BarrierConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Barrier {
    name: &'static str,
    timeout: Duration,
    poll: Duration,
}

impl Barrier {
    pub fn new(name: &'static str, config: &BarrierConfig) -> Self {
        Self {
            name,
            timeout: Duration::from_millis(config.timeout_ms),
            poll: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait until `ready` returns `true`.
    ///
    /// Returns the time spent waiting, [`ConsensusError::BarrierTimeout`]
    /// past the deadline, or [`ConsensusError::Stopped`] once `stop` is set.
    pub async fn wait<F>(&self, mut ready: F, stop: &watch::Receiver<bool>) -> ConsensusResult<Duration>
    where
        F: FnMut() -> bool,
    {
        let started = Instant::now();
        loop {
            if *stop.borrow() {
                return Err(ConsensusError::Stopped);
            }
            if ready() {
                let waited = started.elapsed();
                debug!(barrier = self.name, waited_ms = waited.as_millis() as u64, "[se-03] Barrier passed");
                return Ok(waited);
            }
            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(ConsensusError::BarrierTimeout {
                    barrier: self.name,
                    waited_ms: waited.as_millis() as u64,
                });
            }
            sleep(self.poll.min(self.timeout - waited)).await;
        }
    }
}
