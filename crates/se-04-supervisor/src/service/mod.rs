//! # Supervisor Service
//!
//! One task injects the dataset while the main loop collects block
//! reports, triggers repartitions and decides when the run is over.
//!
//! ```text
//! TxSource ──batch──→ Committee::route ──Inject──→ shard primaries
//!                                                        │
//!            ┌──────────────── BlockInfo ←───────────────┘
//!            ▼
//!   stop gap / epochs / broker hop 2 ──Inject──→ recipient shard
//!            │
//!   gap ≥ threshold and dataset done ──Stop──→ every node
//! ```

use crate::domain::{Committee, Injection, StopSignal, SupervisorError, SupervisorResult};
use crate::ports::TxSource;
use emu_telemetry::{BLOCK_INFOS_RECEIVED, REPARTITIONS, TXS_INJECTED};
use parking_lot::Mutex;
use shared_net::{BlockInfoMsg, Inbox, InjectTxs, Message, PartitionModifiedMap, Transport};
use shared_types::EmulatorConfig;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pause between two injected slices of `inject_speed` transfers.
pub const INJECT_PERIOD: Duration = Duration::from_secs(1);

/// Counters reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub injected: usize,
    pub block_infos: u64,
    pub repartitions: u64,
}

pub struct Supervisor {
    config: Arc<EmulatorConfig>,
    transport: Arc<dyn Transport>,
    committee: Mutex<Committee>,
    stop_gap: StopSignal,
    injected: AtomicUsize,
    block_infos: AtomicU64,
    repartitions: AtomicU64,
}

impl Supervisor {
    pub fn new(config: Arc<EmulatorConfig>, transport: Arc<dyn Transport>) -> SupervisorResult<Self> {
        config.validate()?;
        let committee = Committee::new(&config)?;
        Ok(Self {
            stop_gap: StopSignal::new(config.stop_threshold),
            committee: Mutex::new(committee),
            config,
            transport,
            injected: AtomicUsize::new(0),
            block_infos: AtomicU64::new(0),
            repartitions: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            injected: self.injected.load(Ordering::Acquire),
            block_infos: self.block_infos.load(Ordering::Acquire),
            repartitions: self.repartitions.load(Ordering::Acquire),
        }
    }

    /// Inject `source`, collect reports from `inbox`, stop every node once
    /// the run is drained.
    pub async fn run(self: Arc<Self>, mut inbox: Inbox, source: Box<dyn TxSource>) -> SupervisorResult<RunSummary> {
        let uses_clpa = self.config.strategy.uses_clpa();
        info!(
            strategy = %self.config.strategy,
            shards = self.config.shard_num,
            nodes_per_shard = self.config.nodes_per_shard,
            "[se-04] Supervisor started"
        );

        let mut injector = tokio::spawn(self.clone().inject_all(source));
        let mut injector_done = false;
        let mut tick = interval(Duration::from_millis(self.config.block_interval_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let clpa_period = Duration::from_millis(self.config.clpa.frequency_ms.max(1));
        let mut next_repartition = Instant::now() + clpa_period;

        loop {
            tokio::select! {
                msg = inbox.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await?,
                    None => {
                        warn!("[se-04] Inbox closed, ending run");
                        break;
                    }
                },
                joined = &mut injector, if !injector_done => {
                    injector_done = true;
                    joined.map_err(|e| SupervisorError::Task(e.to_string()))??;
                }
                _ = tick.tick() => {
                    if uses_clpa && Instant::now() >= next_repartition {
                        self.repartition_tick().await?;
                        next_repartition = Instant::now() + clpa_period;
                    }
                    if injector_done && self.ready_to_stop() {
                        break;
                    }
                }
            }
        }

        if !injector_done {
            injector.abort();
        }
        self.stop_all().await;
        let summary = self.summary();
        info!(
            injected = summary.injected,
            block_infos = summary.block_infos,
            repartitions = summary.repartitions,
            "[se-04] Supervisor finished"
        );
        Ok(summary)
    }

    fn ready_to_stop(&self) -> bool {
        self.stop_gap.gap_enough() && !self.committee.lock().migration_pending()
    }

    // =========================================================================
    // INJECTION
    // =========================================================================

    async fn inject_all(self: Arc<Self>, mut source: Box<dyn TxSource>) -> SupervisorResult<()> {
        let batch_size = self.config.batch_size.max(1);
        let speed = self.config.inject_speed.max(1);
        let mut first = true;
        loop {
            let (returned, batch) = tokio::task::spawn_blocking(move || {
                let batch = source.next_batch(batch_size);
                (source, batch)
            })
            .await
            .map_err(|e| SupervisorError::Task(e.to_string()))?;
            source = returned;
            let batch = batch?;
            if batch.is_empty() {
                break;
            }

            for slice in batch.chunks(speed) {
                if !first {
                    sleep(INJECT_PERIOD).await;
                }
                first = false;
                let routed = self.committee.lock().route(slice.to_vec());
                self.inject(routed).await?;
                self.stop_gap.reset();
            }
        }
        info!(
            injected = self.injected.load(Ordering::Acquire),
            "[se-04] Dataset fully injected"
        );
        Ok(())
    }

    async fn inject(&self, routed: Injection) -> SupervisorResult<()> {
        for (shard, txs) in routed {
            if txs.is_empty() {
                continue;
            }
            let count = txs.len();
            let msg = Message::Inject(InjectTxs { txs, to_shard: shard });
            self.send(&msg, &self.config.nodes.primary(shard)).await?;
            let label = shard.to_string();
            TXS_INJECTED.with_label_values(&[label.as_str()]).inc_by(count as f64);
            self.injected.fetch_add(count, Ordering::AcqRel);
            debug!(shard, count, "[se-04] Injected transactions");
        }
        Ok(())
    }

    // =========================================================================
    // COLLECTION
    // =========================================================================

    async fn handle_message(&self, msg: Message) -> SupervisorResult<()> {
        match msg {
            Message::BlockInfo(info) => self.handle_block_info(*info).await,
            other => {
                debug!(msg_type = %other.message_type(), "[se-04] Ignoring message");
                Ok(())
            }
        }
    }

    async fn handle_block_info(&self, info: BlockInfoMsg) -> SupervisorResult<()> {
        let label = info.sender_shard.to_string();
        BLOCK_INFOS_RECEIVED.with_label_values(&[label.as_str()]).inc();
        self.block_infos.fetch_add(1, Ordering::AcqRel);
        if info.block_body_length == 0 {
            self.stop_gap.inc();
        } else {
            self.stop_gap.reset();
        }

        let released = self.committee.lock().on_block_info(&info);
        info!(
            shard = info.sender_shard,
            epoch = info.epoch,
            txs = info.block_body_length,
            relay1 = info.relay1_tx_num(),
            broker1 = info.broker1_tx_num(),
            broker2 = info.broker2_tx_num(),
            latency_ms = info.commit_time.saturating_sub(info.propose_time),
            stop_gap = self.stop_gap.gap(),
            "[se-04] Block report received"
        );
        self.inject(released).await
    }

    // =========================================================================
    // REPARTITION
    // =========================================================================

    async fn repartition_tick(&self) -> SupervisorResult<()> {
        let modified = {
            let mut committee = self.committee.lock();
            if committee.migration_pending() {
                let sent = committee.maps_sent();
                committee.abandon_migration();
                REPARTITIONS.with_label_values(&["unconfirmed"]).inc();
                warn!(
                    sent,
                    confirmed = committee.confirmed_epoch(),
                    "[se-04] Repartition not committed by every shard, dropping it"
                );
                return Ok(());
            }
            committee.repartition()
        };
        let Some(partition_modified) = modified else {
            REPARTITIONS.with_label_values(&["skipped"]).inc();
            debug!("[se-04] Nothing to repartition");
            return Ok(());
        };

        let moved = partition_modified.len();
        let msg = Message::PartitionModifiedMap(PartitionModifiedMap { partition_modified });
        for shard in 0..self.config.shard_num {
            self.send(&msg, &self.config.nodes.primary(shard)).await?;
        }
        self.repartitions.fetch_add(1, Ordering::AcqRel);
        REPARTITIONS.with_label_values(&["sent"]).inc();
        info!(moved, "[se-04] Modified map sent to every shard");
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Encode failures are fatal; delivery failures are logged.
    async fn send(&self, msg: &Message, addr: &str) -> SupervisorResult<()> {
        let frame = msg.to_frame()?;
        if let Err(e) = self.transport.send_frame(&frame, addr).await {
            warn!(addr = %addr, msg_type = %msg.message_type(), error = %e, "[se-04] Send failed");
        }
        Ok(())
    }

    async fn stop_all(&self) {
        info!("[se-04] Sending stop to all nodes");
        for addr in self.config.all_node_addrs() {
            if let Err(e) = self.send(&Message::Stop, &addr).await {
                warn!(addr = %addr, error = %e, "[se-04] Stop not sent");
            }
        }
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests;
