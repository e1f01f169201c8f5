//! # Cluster Harness
//!
//! Every replica of every shard plus the supervisor, each on its own task,
//! talking through one [`InMemoryNetwork`].

use num_bigint::BigUint;
use se_01_ledger::{InMemoryLedger, Ledger};
use se_03_pbft::{ConsensusResult, ShardNode};
use se_04_supervisor::{MemorySource, RunSummary, Supervisor, SupervisorResult};
use shared_net::InMemoryNetwork;
use shared_types::{EmulatorConfig, ShardId, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Upper bound on a whole emulated run.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a replica winding down after `stop`.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a transfer of `value` units.
pub fn transfer(sender: &str, recipient: &str, value: u32) -> Transaction {
    Transaction::new(sender.into(), recipient.into(), BigUint::from(value), 0)
}

pub struct Cluster {
    pub config: Arc<EmulatorConfig>,
    pub network: InMemoryNetwork,
    /// `ledgers[shard][node]`.
    pub ledgers: Vec<Vec<Arc<InMemoryLedger>>>,
    replicas: Vec<JoinHandle<ConsensusResult<()>>>,
    supervisor: JoinHandle<SupervisorResult<RunSummary>>,
}

impl Cluster {
    /// Start every replica, then the supervisor over `txs`.
    pub fn start(config: EmulatorConfig, txs: Vec<Transaction>) -> Self {
        let config = Arc::new(config);
        let network = InMemoryNetwork::new();
        let supervisor_inbox = network.register(config.nodes.supervisor());

        let mut ledgers = Vec::new();
        let mut replicas = Vec::new();
        for shard in 0..config.shard_num {
            let mut shard_ledgers = Vec::new();
            for node in 0..config.nodes_per_shard {
                let inbox = network.register(&config.nodes.addr(shard, node));
                let ledger = Arc::new(
                    InMemoryLedger::from_config(shard, &config).expect("ledger from test config"),
                );
                let replica = ShardNode::from_config(
                    config.clone(),
                    shard,
                    node,
                    ledger.clone(),
                    Arc::new(network.transport()),
                )
                .expect("replica from test config");
                replicas.push(tokio::spawn(Arc::new(replica).run(inbox)));
                shard_ledgers.push(ledger);
            }
            ledgers.push(shard_ledgers);
        }

        let supervisor = Arc::new(
            Supervisor::new(config.clone(), Arc::new(network.transport()))
                .expect("supervisor from test config"),
        );
        let supervisor = tokio::spawn(supervisor.run(supervisor_inbox, Box::new(MemorySource::new(txs))));

        Self {
            config,
            network,
            ledgers,
            replicas,
            supervisor,
        }
    }

    /// Wait for the supervisor to end the run and every replica to stop.
    pub async fn finish(self) -> (RunSummary, Vec<Vec<Arc<InMemoryLedger>>>) {
        let summary = timeout(RUN_TIMEOUT, self.supervisor)
            .await
            .expect("run did not end in time")
            .expect("supervisor task panicked")
            .expect("supervisor failed");
        for replica in self.replicas {
            timeout(STOP_TIMEOUT, replica)
                .await
                .expect("replica did not stop")
                .expect("replica task panicked")
                .expect("replica failed");
        }
        (summary, self.ledgers)
    }
}

/// Balance of `addr` on every replica of `shard`.
pub fn balances(ledgers: &[Vec<Arc<InMemoryLedger>>], shard: ShardId, addr: &str) -> Vec<Option<BigUint>> {
    ledgers[shard as usize]
        .iter()
        .map(|ledger| ledger.account(addr).map(|state| state.balance))
        .collect()
}

/// Owner of `addr` according to every replica of `shard`.
pub fn owners(ledgers: &[Vec<Arc<InMemoryLedger>>], shard: ShardId, addr: &str) -> Vec<ShardId> {
    ledgers[shard as usize]
        .iter()
        .map(|ledger| ledger.partition().get(addr))
        .collect()
}
