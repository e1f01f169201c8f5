use super::*;
use crate::adapters::MemorySource;
use num_bigint::BigUint;
use shared_net::InMemoryNetwork;
use shared_types::{ShardId, StrategyKind, Transaction};
use tokio::task::JoinHandle;

fn config(strategy: StrategyKind) -> EmulatorConfig {
    let mut config = EmulatorConfig::for_testing();
    config.strategy = strategy;
    config
}

fn transfer(sender: &str, recipient: &str) -> Transaction {
    Transaction::new(sender.into(), recipient.into(), BigUint::from(2u32), 0)
}

fn report(shard: ShardId, epoch: u64, txs: usize) -> BlockInfoMsg {
    BlockInfoMsg {
        sender_shard: shard,
        epoch,
        block_body_length: txs,
        ..BlockInfoMsg::default()
    }
}

/// A supervisor whose shard nodes are plain inboxes.
struct Harness {
    config: Arc<EmulatorConfig>,
    network: InMemoryNetwork,
    supervisor: Arc<Supervisor>,
    nodes: Vec<Vec<Inbox>>,
    handle: JoinHandle<SupervisorResult<RunSummary>>,
}

impl Harness {
    fn start(config: EmulatorConfig, txs: Vec<Transaction>) -> Self {
        let config = Arc::new(config);
        let network = InMemoryNetwork::new();
        let inbox = network.register(config.nodes.supervisor());
        let nodes = (0..config.shard_num)
            .map(|shard| {
                (0..config.nodes_per_shard)
                    .map(|node| network.register(&config.nodes.addr(shard, node)))
                    .collect()
            })
            .collect();
        let supervisor = Arc::new(Supervisor::new(config.clone(), Arc::new(network.transport())).unwrap());
        let handle = tokio::spawn(
            supervisor
                .clone()
                .run(inbox, Box::new(MemorySource::new(txs))),
        );
        Self {
            config,
            network,
            supervisor,
            nodes,
            handle,
        }
    }

    async fn report(&self, info: BlockInfoMsg) {
        self.network
            .transport()
            .send(&Message::BlockInfo(Box::new(info)), self.config.nodes.supervisor())
            .await
            .unwrap();
    }

    async fn next(&mut self, shard: ShardId) -> Message {
        self.nodes[shard as usize][0].recv().await.unwrap()
    }

    /// Send enough empty reports to end the run and check that every node
    /// got the stop message.
    async fn finish(mut self, epoch: u64) -> RunSummary {
        for _ in 0..self.config.stop_threshold {
            self.report(report(0, epoch, 0)).await;
        }
        let summary = self.handle.await.unwrap().unwrap();
        for inbox in self.nodes.iter_mut().flatten() {
            let mut stopped = false;
            while let Ok(msg) = inbox.try_recv() {
                stopped |= msg == Message::Stop;
            }
            assert!(stopped);
        }
        summary
    }
}

#[tokio::test(start_paused = true)]
async fn test_relay_injects_by_sender_and_stops_after_empty_gap() {
    let mut h = Harness::start(
        config(StrategyKind::Relay),
        vec![
            transfer("a0000000", "b0000001"),
            transfer("b0000001", "a0000000"),
            transfer("a0000002", "b0000003"),
        ],
    );
    match h.next(0).await {
        Message::Inject(inject) => {
            assert_eq!(inject.to_shard, 0);
            assert_eq!(inject.txs.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    match h.next(1).await {
        Message::Inject(inject) => assert_eq!(inject.txs[0].sender, "b0000001"),
        other => panic!("unexpected {other:?}"),
    }

    for _ in 0..3 {
        h.report(report(1, 0, 0)).await;
    }
    h.report(report(1, 0, 5)).await;
    sleep(Duration::from_millis(200)).await;
    assert!(!h.handle.is_finished());

    let summary = h.finish(0).await;
    assert_eq!(
        summary,
        RunSummary {
            injected: 3,
            block_infos: 8,
            repartitions: 0,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_broker_releases_second_hop_after_report() {
    let mut h = Harness::start(config(StrategyKind::Broker), vec![transfer("a0000000", "b0000001")]);
    let hop1 = match h.next(0).await {
        Message::Inject(inject) => inject.txs[0].clone(),
        other => panic!("unexpected {other:?}"),
    };
    assert!(hop1.is_broker_hop1());

    h.report(BlockInfoMsg {
        broker1_txs: vec![hop1.clone()],
        ..report(0, 0, 1)
    })
    .await;
    match h.next(1).await {
        Message::Inject(inject) => {
            let hop2 = &inject.txs[0];
            assert!(hop2.is_broker_hop2());
            assert_eq!(hop2.sender, hop1.recipient);
            assert_eq!(hop2.recipient, "b0000001");
        }
        other => panic!("unexpected {other:?}"),
    }

    let summary = h.finish(0).await;
    assert_eq!(summary.injected, 2);
}

fn clpa_run() -> Harness {
    let mut config = config(StrategyKind::Clpa);
    config.clpa.frequency_ms = 50;
    let mut txs = vec![transfer("a0000000", "b0000001"); 3];
    txs.push(transfer("a0000002", "c0000004"));
    Harness::start(config, txs)
}

#[tokio::test(start_paused = true)]
async fn test_clpa_sends_modified_map_and_waits_for_new_epoch() {
    let mut h = clpa_run();
    match h.next(1).await {
        Message::PartitionModifiedMap(map) => {
            assert_eq!(map.partition_modified.get("a0000000"), Some(&1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.supervisor.committee.lock().migration_pending());

    h.report(report(0, 1, 2)).await;
    h.report(report(1, 1, 2)).await;
    let summary = h.finish(1).await;
    assert_eq!(summary.repartitions, 1);
    assert_eq!(summary.injected, 4);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_repartition_is_dropped() {
    let mut h = clpa_run();
    assert!(matches!(h.next(1).await, Message::PartitionModifiedMap(_)));

    while h.supervisor.committee.lock().maps_sent() != 0 {
        sleep(Duration::from_millis(10)).await;
    }
    assert!(!h.supervisor.committee.lock().migration_pending());
    let summary = h.finish(0).await;
    assert_eq!(summary.repartitions, 1);
}

#[test]
fn test_broker_without_brokers_is_rejected() {
    let mut config = config(StrategyKind::Broker);
    config.broker_num = 0;
    let network = InMemoryNetwork::new();
    let result = Supervisor::new(Arc::new(config), Arc::new(network.transport()));
    assert!(matches!(result, Err(SupervisorError::NoBrokers)));
}
